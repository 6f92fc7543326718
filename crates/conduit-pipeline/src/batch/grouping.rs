//! Splits a batch into groups handled concurrently, then restores input order.
//!
//! Groups are dispatched together and joined once every group finished.
//! Each group's outcomes are mapped back to input positions by request
//! equality, taking the first unused position, so equal duplicates keep
//! their relative order. A grouper must hand back the original items (or
//! values equal to them) or the pipeline panics, since no positional
//! answer can be given.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::batch::{BatchError, BatchGrouper, BatchValue};
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ensure_active;

/// Grouper that keeps the whole batch together.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleGroup;

#[async_trait]
impl<Req> BatchGrouper<Req> for SingleGroup
where
    Req: Clone + Send + Sync,
{
    async fn group(&self, items: &[Req], _cancel: &CancellationToken) -> Vec<Vec<Req>> {
        if items.is_empty() {
            Vec::new()
        } else {
            vec![items.to_vec()]
        }
    }
}

/// Runs a batch handler once per group produced by a [`BatchGrouper`].
pub struct GroupingHandler<H, Req> {
    inner: H,
    grouper: Arc<dyn BatchGrouper<Req>>,
}

impl<H, Req> GroupingHandler<H, Req> {
    /// Wraps the batch handler `inner`, splitting batches with `grouper`.
    pub fn new(inner: H, grouper: Arc<dyn BatchGrouper<Req>>) -> Self {
        Self { inner, grouper }
    }
}

/// One item's outcome before it is placed back at its input position.
enum Outcome<Resp> {
    Value(Resp),
    Erased(BatchValue),
    Failed(PipelineError),
}

impl<Resp: Any + Send + Sync> Outcome<Resp> {
    fn into_erased(self) -> Result<BatchValue, PipelineError> {
        match self {
            Self::Value(value) => Ok(BatchValue::new(value)),
            Self::Erased(value) => Ok(value),
            Self::Failed(error) => Err(error),
        }
    }
}

/// Expands one group's result into per-item outcomes.
fn split_group<Resp>(
    group_len: usize,
    result: Result<Vec<Resp>, PipelineError>,
) -> Vec<Outcome<Resp>> {
    let outcomes: Vec<Outcome<Resp>> = match result {
        Ok(values) => values.into_iter().map(Outcome::Value).collect(),
        Err(PipelineError::Batch(error)) => error
            .into_items()
            .into_iter()
            .map(|item| match item {
                Ok(value) => Outcome::Erased(value),
                Err(error) => Outcome::Failed(error),
            })
            .collect(),
        Err(error) => (0..group_len)
            .map(|_| Outcome::Failed(error.clone()))
            .collect(),
    };
    assert_eq!(
        outcomes.len(),
        group_len,
        "batch handler answered a group of {group_len} with {} outcomes",
        outcomes.len()
    );
    outcomes
}

#[async_trait]
impl<H, Req, Resp> RequestHandler<Vec<Req>> for GroupingHandler<H, Req>
where
    Req: PartialEq + Debug + Send + Sync,
    Resp: Any + Send + Sync,
    H: RequestHandler<Vec<Req>, Response = Vec<Resp>>,
{
    type Response = Vec<Resp>;

    async fn handle(
        &self,
        request: &Vec<Req>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Resp>, PipelineError> {
        ensure_active(cancel)?;
        let groups = self.grouper.group(request, cancel).await;
        debug!(items = request.len(), groups = groups.len(), "batch grouped");

        let results = join_all(groups.iter().map(|group| self.inner.handle(group, cancel))).await;
        if results
            .iter()
            .any(|result| matches!(result, Err(PipelineError::Cancelled)))
        {
            return Err(PipelineError::Cancelled);
        }

        let mut placed: Vec<Option<Outcome<Resp>>> = request.iter().map(|_| None).collect();
        for (group, result) in groups.iter().zip(results) {
            for (item, outcome) in group.iter().zip(split_group(group.len(), result)) {
                let position = request
                    .iter()
                    .zip(&placed)
                    .position(|(candidate, slot)| slot.is_none() && candidate == item)
                    .unwrap_or_else(|| {
                        panic!(
                            "grouped item {item:?} matches no unanswered input; \
                             groupers must return the original items"
                        )
                    });
                placed[position] = Some(outcome);
            }
        }

        let outcomes: Vec<Outcome<Resp>> = placed
            .into_iter()
            .zip(request)
            .map(|(slot, item)| {
                slot.unwrap_or_else(|| panic!("input {item:?} was left out of every group"))
            })
            .collect();

        if outcomes.iter().all(|o| matches!(o, Outcome::Value(_))) {
            return Ok(outcomes
                .into_iter()
                .filter_map(|o| match o {
                    Outcome::Value(value) => Some(value),
                    Outcome::Erased(_) | Outcome::Failed(_) => None,
                })
                .collect());
        }
        Err(PipelineError::Batch(BatchError::new(
            outcomes.into_iter().map(Outcome::into_erased).collect(),
        )))
    }
}
