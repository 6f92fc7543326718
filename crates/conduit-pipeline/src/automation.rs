//! Hands the events a response exposes to a process manager.
//!
//! Automation runs after the unit of work committed, so a failure here
//! cannot undo the write. It surfaces as
//! [`PipelineError::AutomationFailed`] to tell the caller the changes were
//! kept.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::error::PipelineError;
use conduit_core::event::EmitsEvents;
use conduit_core::handler::RequestHandler;
use conduit_core::publish::ProcessManager;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::ensure_active;

/// Runs the process manager over the events of each successful response.
pub struct AutomationHandler<H> {
    inner: H,
    process: Arc<dyn ProcessManager>,
}

impl<H> AutomationHandler<H> {
    /// Wraps `inner`, feeding its responses' events to `process`.
    pub fn new(inner: H, process: Arc<dyn ProcessManager>) -> Self {
        Self { inner, process }
    }
}

#[async_trait]
impl<Req, H> RequestHandler<Req> for AutomationHandler<H>
where
    Req: Send + Sync,
    H: RequestHandler<Req>,
    H::Response: EmitsEvents,
{
    type Response = H::Response;

    async fn handle(
        &self,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<H::Response, PipelineError> {
        ensure_active(cancel)?;
        let response = self.inner.handle(request, cancel).await?;
        let events = response.events();
        if let Err(source) = self.process.handle_next(&events, cancel).await {
            if source.is_cancelled() {
                return Err(source);
            }
            error!(
                request = std::any::type_name::<Req>(),
                events = events.len(),
                error = %source,
                "automation failed after commit"
            );
            return Err(PipelineError::AutomationFailed {
                source: Box::new(source),
            });
        }
        debug!(events = events.len(), "automation complete");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use conduit_core::event::SharedEvent;
    use conduit_test_support::{NamedEvent, ScriptedHandler};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    struct Shipped {
        events: Vec<SharedEvent>,
    }

    impl EmitsEvents for Shipped {
        fn events(&self) -> Vec<SharedEvent> {
            self.events.clone()
        }
    }

    struct RecordingProcess {
        seen: Mutex<Vec<String>>,
        outcome: Result<(), PipelineError>,
    }

    #[async_trait]
    impl ProcessManager for RecordingProcess {
        async fn handle_next(
            &self,
            events: &[SharedEvent],
            _cancel: &CancellationToken,
        ) -> Result<(), PipelineError> {
            self.seen
                .lock()
                .extend(events.iter().map(|e| e.event_name().to_owned()));
            self.outcome.clone()
        }
    }

    fn shipped() -> Arc<ScriptedHandler<u32, Shipped>> {
        Arc::new(ScriptedHandler::from_fn(|_| {
            Ok(Shipped {
                events: vec![Arc::new(NamedEvent::new("order.shipped"))],
            })
        }))
    }

    #[tokio::test]
    async fn test_response_events_reach_process_manager() {
        let process = Arc::new(RecordingProcess {
            seen: Mutex::new(Vec::new()),
            outcome: Ok(()),
        });
        let handler = AutomationHandler::new(shipped(), process.clone());

        let result = handler.handle(&1, &CancellationToken::new()).await;

        assert!(result.is_ok());
        assert_eq!(*process.seen.lock(), vec!["order.shipped".to_owned()]);
    }

    #[tokio::test]
    async fn test_process_failure_is_reported_as_automation_failure() {
        let process = Arc::new(RecordingProcess {
            seen: Mutex::new(Vec::new()),
            outcome: Err(PipelineError::business("carrier unavailable")),
        });
        let handler = AutomationHandler::new(shipped(), process);

        let result = handler.handle(&1, &CancellationToken::new()).await;

        assert!(matches!(
            result,
            Err(PipelineError::AutomationFailed { source })
                if *source == PipelineError::business("carrier unavailable")
        ));
    }

    #[tokio::test]
    async fn test_cancelled_request_runs_neither_handler_nor_automation() {
        let process = Arc::new(RecordingProcess {
            seen: Mutex::new(Vec::new()),
            outcome: Ok(()),
        });
        let inner = shipped();
        let handler = AutomationHandler::new(Arc::clone(&inner), process.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = handler.handle(&1, &cancel).await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(inner.calls(), 0);
        assert!(process.seen.lock().is_empty());
    }
}
