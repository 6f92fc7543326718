//! Runs a singular handler once per batch item.

use std::any::Any;

use async_trait::async_trait;
use conduit_core::batch::BatchError;
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ensure_active;

/// Adapts a handler for `Req` into one for `Vec<Req>`.
///
/// Items run sequentially in input order. Cancellation stops the batch
/// before the next item.
pub struct FanOutHandler<H> {
    inner: H,
}

impl<H> FanOutHandler<H> {
    /// Wraps the singular handler `inner`.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<Req, H> RequestHandler<Vec<Req>> for FanOutHandler<H>
where
    Req: Send + Sync,
    H: RequestHandler<Req>,
    H::Response: Any + Sync,
{
    type Response = Vec<H::Response>;

    async fn handle(
        &self,
        request: &Vec<Req>,
        cancel: &CancellationToken,
    ) -> Result<Vec<H::Response>, PipelineError> {
        let mut results = Vec::with_capacity(request.len());
        for item in request {
            ensure_active(cancel)?;
            results.push(self.inner.handle(item, cancel).await);
        }

        if results.iter().all(Result::is_ok) {
            return results.into_iter().collect();
        }
        let error = BatchError::from_results(results);
        debug!(
            items = error.len(),
            failed = error.failures().count(),
            "batch completed with failures"
        );
        Err(PipelineError::Batch(error))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use conduit_test_support::ScriptedHandler;

    use super::*;

    fn rejecting_two() -> Arc<ScriptedHandler<u32, String>> {
        Arc::new(ScriptedHandler::from_fn(|r| match r {
            2 => Err(PipelineError::business("two is reserved")),
            n => Ok(format!("item-{n}")),
        }))
    }

    #[tokio::test]
    async fn test_all_items_succeed_in_order() {
        let handler = FanOutHandler::new(rejecting_two());

        let result = handler.handle(&vec![3, 1, 4], &CancellationToken::new()).await;

        assert_eq!(
            result,
            Ok(vec!["item-3".to_owned(), "item-1".to_owned(), "item-4".to_owned()])
        );
    }

    #[tokio::test]
    async fn test_failed_item_keeps_every_outcome_in_position() {
        // Arrange
        let inner = rejecting_two();
        let handler = FanOutHandler::new(Arc::clone(&inner));

        // Act
        let result = handler.handle(&vec![1, 2, 3], &CancellationToken::new()).await;

        // Assert
        let Err(PipelineError::Batch(error)) = result else {
            panic!("expected a batch error");
        };
        let items = error.typed::<String>().unwrap();
        assert_eq!(
            items,
            vec![
                Ok("item-1".to_owned()),
                Err(PipelineError::business("two is reserved")),
                Ok("item-3".to_owned()),
            ]
        );
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds_without_calls() {
        let inner = rejecting_two();
        let handler = FanOutHandler::new(Arc::clone(&inner));

        let result = handler.handle(&Vec::new(), &CancellationToken::new()).await;

        assert_eq!(result, Ok(Vec::new()));
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_batch_stops() {
        let inner = rejecting_two();
        let handler = FanOutHandler::new(Arc::clone(&inner));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = handler.handle(&vec![1, 3], &cancel).await;

        assert_eq!(result, Err(PipelineError::Cancelled));
        assert_eq!(inner.calls(), 0);
    }
}
