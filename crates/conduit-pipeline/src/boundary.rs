//! The outermost stage: the one place unexpected failures are caught.
//!
//! A panic or [`PipelineError::Fault`] from anywhere inside is logged at
//! critical severity with the request attached and replaced by
//! [`PipelineError::Unexpected`]. Faults nested in an automation failure or
//! in batch items are replaced in place, so the shape of the error survives.
//! Expected errors pass through untouched.

use std::fmt::Debug;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use conduit_core::batch::BatchError;
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{ensure_active, panic_message};

/// Converts unexpected failures into error results.
pub struct ErrorBoundary<H> {
    inner: H,
}

impl<H> ErrorBoundary<H> {
    /// Wraps `inner`.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<Req, H> RequestHandler<Req> for ErrorBoundary<H>
where
    Req: Debug + Send + Sync,
    H: RequestHandler<Req>,
{
    type Response = H::Response;

    async fn handle(
        &self,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<H::Response, PipelineError> {
        ensure_active(cancel)?;
        let outcome = AssertUnwindSafe(self.inner.handle(request, cancel))
            .catch_unwind()
            .await;

        match outcome {
            Ok(outcome) => outcome.map_err(|failure| contain(failure, request)),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(
                    severity = "critical",
                    request = ?request,
                    panic = %message,
                    "handler panicked"
                );
                Err(PipelineError::Unexpected { message })
            }
        }
    }
}

/// Replaces every fault in `failure` with [`PipelineError::Unexpected`],
/// logging each one.
fn contain<Req: Debug>(failure: PipelineError, request: &Req) -> PipelineError {
    match failure {
        PipelineError::Fault(fault) => {
            error!(
                severity = "critical",
                request = ?request,
                error = %fault,
                "unhandled fault"
            );
            PipelineError::Unexpected {
                message: fault.to_string(),
            }
        }
        PipelineError::AutomationFailed { source } => PipelineError::AutomationFailed {
            source: Box::new(contain(*source, request)),
        },
        PipelineError::Batch(batch) => PipelineError::Batch(BatchError::new(
            batch
                .into_iter()
                .map(|item| item.map_err(|nested| contain(nested, request)))
                .collect(),
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use conduit_logging::entry::Severity;
    use conduit_test_support::ScriptedHandler;

    use super::*;
    use crate::log_capture::LogCapture;

    #[tokio::test]
    async fn test_panic_becomes_unexpected_error() {
        let inner = Arc::new(ScriptedHandler::<u32, u32>::panicking("index out of range"));
        let boundary = ErrorBoundary::new(inner);

        let result = boundary.handle(&3, &CancellationToken::new()).await;

        assert_eq!(
            result,
            Err(PipelineError::Unexpected {
                message: "index out of range".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn test_fault_becomes_unexpected_error_with_cause_chain() {
        let inner = Arc::new(ScriptedHandler::<u32, u32>::from_fn(|_| {
            Err(anyhow!("socket closed").context("loading account").into())
        }));
        let boundary = ErrorBoundary::new(inner);

        let result = boundary.handle(&3, &CancellationToken::new()).await;

        assert_eq!(
            result,
            Err(PipelineError::Unexpected {
                message: "loading account: socket closed".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn test_expected_errors_and_values_pass_through() {
        let inner = Arc::new(ScriptedHandler::<u32, u32>::from_fn(|r| match r {
            0 => Err(PipelineError::business("zero is not allowed")),
            n => Ok(n + 1),
        }));
        let boundary = ErrorBoundary::new(inner);
        let cancel = CancellationToken::new();

        assert_eq!(boundary.handle(&1, &cancel).await, Ok(2));
        assert_eq!(
            boundary.handle(&0, &cancel).await,
            Err(PipelineError::business("zero is not allowed"))
        );
    }

    #[tokio::test]
    async fn test_cancelled_request_never_reaches_the_handler() {
        let inner = Arc::new(ScriptedHandler::<u32, u32>::from_fn(|r| Ok(r + 1)));
        let boundary = ErrorBoundary::new(Arc::clone(&inner));
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(boundary.handle(&1, &cancel).await, Err(PipelineError::Cancelled));
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test]
    async fn test_panic_is_logged_critical_with_request() {
        // Arrange
        let logs = LogCapture::start();
        let inner = Arc::new(ScriptedHandler::<u32, u32>::panicking("index out of range"));
        let boundary = ErrorBoundary::new(inner);

        // Act
        let _ = boundary.handle(&3, &CancellationToken::new()).await;

        // Assert
        let entries = logs.finish("handler panicked");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Critical);
        assert_eq!(entries[0].data["panic"], "index out of range");
        assert_eq!(entries[0].data["request"], "3");
    }

    #[tokio::test]
    async fn test_fault_is_logged_critical_with_its_error() {
        let logs = LogCapture::start();
        let inner = Arc::new(ScriptedHandler::<u32, u32>::from_fn(|_| {
            Err(PipelineError::fault(anyhow!("socket closed")))
        }));
        let boundary = ErrorBoundary::new(inner);

        let _ = boundary.handle(&5, &CancellationToken::new()).await;

        let entries = logs.finish("unhandled fault");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Critical);
        assert_eq!(entries[0].error.as_deref(), Some("socket closed"));
        assert_eq!(entries[0].data["request"], "5");
    }

    #[tokio::test]
    async fn test_fault_behind_automation_failure_is_converted() {
        // Arrange
        let logs = LogCapture::start();
        let inner = Arc::new(ScriptedHandler::<u32, u32>::from_fn(|_| {
            Err(PipelineError::AutomationFailed {
                source: Box::new(PipelineError::fault(anyhow!("socket closed"))),
            })
        }));
        let boundary = ErrorBoundary::new(inner);

        // Act
        let result = boundary.handle(&1, &CancellationToken::new()).await;

        // Assert
        assert_eq!(
            result,
            Err(PipelineError::AutomationFailed {
                source: Box::new(PipelineError::Unexpected {
                    message: "socket closed".to_owned()
                })
            })
        );
        let entries = logs.finish("unhandled fault");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_faulted_batch_item_is_converted_in_place() {
        // Arrange
        let logs = LogCapture::start();
        let inner = Arc::new(ScriptedHandler::<Vec<u32>, Vec<u32>>::from_fn(|items| {
            Err(PipelineError::Batch(BatchError::from_results(
                items
                    .iter()
                    .map(|item| match item {
                        2 => Err(PipelineError::fault(anyhow!("disk gone"))),
                        n => Ok(*n),
                    })
                    .collect(),
            )))
        }));
        let boundary = ErrorBoundary::new(inner);

        // Act
        let result = boundary
            .handle(&vec![1, 2, 3], &CancellationToken::new())
            .await;

        // Assert
        let Err(PipelineError::Batch(error)) = result else {
            panic!("expected a batch error");
        };
        assert_eq!(
            error.typed::<u32>().unwrap(),
            vec![
                Ok(1),
                Err(PipelineError::Unexpected {
                    message: "disk gone".to_owned()
                }),
                Ok(3),
            ]
        );
        let entries = logs.finish("unhandled fault");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data["request"], "[1, 2, 3]");
    }
}
