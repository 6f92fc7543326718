//! Deadlock retry.
//!
//! A handler whose persistence layer reports a deadlock is invoked again
//! after a short pause, up to a fixed number of invocations in total. Once
//! the budget is spent the caller sees [`PipelineError::Communication`].

use std::time::Duration;

use async_trait::async_trait;
use conduit_core::error::{DatabaseError, Fault, PipelineError};
use conduit_core::handler::RequestHandler;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::ensure_active;

/// How deadlocks are recognised and how often they are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockRetryPolicy {
    max_attempts: u32,
    delay: Duration,
    marker: String,
}

impl DeadlockRetryPolicy {
    /// Creates a policy allowing `max_attempts` invocations in total.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is zero.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration, marker: impl Into<String>) -> Self {
        assert!(max_attempts > 0, "a retry policy needs at least one attempt");
        Self {
            max_attempts,
            delay,
            marker: marker.into(),
        }
    }

    /// Total invocations allowed.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between invocations.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns `true` if `fault` carries a database error mentioning the
    /// deadlock marker anywhere in its cause chain.
    #[must_use]
    pub fn is_deadlock(&self, fault: &Fault) -> bool {
        fault
            .error()
            .chain()
            .filter_map(|cause| cause.downcast_ref::<DatabaseError>())
            .any(|db| db.mentions(&self.marker))
    }
}

impl Default for DeadlockRetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(100), "deadlock")
    }
}

/// Re-invokes its inner handler while it fails with a deadlock.
pub struct DeadlockRetryHandler<H> {
    inner: H,
    policy: DeadlockRetryPolicy,
}

impl<H> DeadlockRetryHandler<H> {
    /// Wraps `inner` with `policy`.
    pub fn new(inner: H, policy: DeadlockRetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<Req, H> RequestHandler<Req> for DeadlockRetryHandler<H>
where
    Req: Send + Sync,
    H: RequestHandler<Req>,
{
    type Response = H::Response;

    async fn handle(
        &self,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<H::Response, PipelineError> {
        let mut attempt = 0;
        loop {
            ensure_active(cancel)?;
            attempt += 1;
            match self.inner.handle(request, cancel).await {
                Err(PipelineError::Fault(fault)) if self.policy.is_deadlock(&fault) => {
                    if attempt >= self.policy.max_attempts {
                        warn!(
                            request = std::any::type_name::<Req>(),
                            attempts = attempt,
                            error = %fault,
                            "deadlock retries exhausted"
                        );
                        return Err(PipelineError::Communication { attempts: attempt });
                    }
                    warn!(
                        request = std::any::type_name::<Req>(),
                        attempt,
                        "deadlock detected, retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(PipelineError::Cancelled),
                        () = tokio::time::sleep(self.policy.delay) => {}
                    }
                }
                outcome => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Context;
    use conduit_test_support::ScriptedHandler;

    use super::*;

    fn quick_policy() -> DeadlockRetryPolicy {
        DeadlockRetryPolicy::new(5, Duration::from_millis(1), "deadlock")
    }

    fn deadlock() -> PipelineError {
        let error = Err::<(), _>(DatabaseError::new("Transaction was DEADLOCKED on lock resources"))
            .context("saving order")
            .unwrap_err();
        PipelineError::fault(error)
    }

    #[tokio::test]
    async fn test_persistent_deadlock_invokes_five_times_then_fails() {
        // Arrange
        let inner = Arc::new(ScriptedHandler::<u32, u32>::from_fn(|_| Err(deadlock())));
        let handler = DeadlockRetryHandler::new(Arc::clone(&inner), quick_policy());

        // Act
        let result = handler.handle(&1, &CancellationToken::new()).await;

        // Assert
        assert_eq!(result, Err(PipelineError::Communication { attempts: 5 }));
        assert_eq!(inner.calls(), 5);
    }

    #[tokio::test]
    async fn test_success_after_deadlock_is_returned() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let inner = Arc::new(ScriptedHandler::<u32, u32>::from_fn(move |r| {
            if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2 {
                Err(deadlock())
            } else {
                Ok(r * 10)
            }
        }));
        let handler = DeadlockRetryHandler::new(Arc::clone(&inner), quick_policy());

        let result = handler.handle(&4, &CancellationToken::new()).await;

        assert_eq!(result, Ok(40));
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_other_faults_are_not_retried() {
        let fault = PipelineError::fault(DatabaseError::new("unique constraint violated"));
        let inner = Arc::new(ScriptedHandler::<u32, u32>::always(Err(fault.clone())));
        let handler = DeadlockRetryHandler::new(Arc::clone(&inner), quick_policy());

        let result = handler.handle(&1, &CancellationToken::new()).await;

        assert_eq!(result, Err(fault));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_business_errors_pass_through_once() {
        let inner = Arc::new(ScriptedHandler::<u32, u32>::always(Err(
            PipelineError::business("deadlock in the story, not the database"),
        )));
        let handler = DeadlockRetryHandler::new(Arc::clone(&inner), quick_policy());

        let result = handler.handle(&1, &CancellationToken::new()).await;

        assert!(matches!(result, Err(PipelineError::Business(_))));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_during_backoff_stops_retrying() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let inner = Arc::new(ScriptedHandler::<u32, u32>::from_fn(move |_| {
            trigger.cancel();
            Err(deadlock())
        }));
        let policy = DeadlockRetryPolicy::new(5, Duration::from_secs(60), "deadlock");
        let handler = DeadlockRetryHandler::new(Arc::clone(&inner), policy);

        let result = handler.handle(&1, &cancel).await;

        assert_eq!(result, Err(PipelineError::Cancelled));
        assert_eq!(inner.calls(), 1);
    }
}
