//! Per-pipeline instance cache.

use std::hash::Hash;

use async_trait::async_trait;
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::ensure_active;

/// Memoises successful responses by request value.
///
/// Failed outcomes are never cached. Two equal requests racing on a miss both
/// run the inner handler; the first to finish fills the slot.
pub struct CachingHandler<H, Req, Resp> {
    inner: H,
    entries: DashMap<Req, Resp>,
}

impl<H, Req, Resp> CachingHandler<H, Req, Resp>
where
    Req: Eq + Hash,
{
    /// Wraps `inner` with an empty cache.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
        }
    }

    /// Number of cached responses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl<H, Req, Resp> RequestHandler<Req> for CachingHandler<H, Req, Resp>
where
    Req: Eq + Hash + Clone + Send + Sync,
    Resp: Clone + Send + Sync,
    H: RequestHandler<Req, Response = Resp>,
{
    type Response = Resp;

    async fn handle(&self, request: &Req, cancel: &CancellationToken) -> Result<Resp, PipelineError> {
        ensure_active(cancel)?;
        if let Some(hit) = self.entries.get(request).map(|entry| entry.value().clone()) {
            trace!(request = std::any::type_name::<Req>(), "cache hit");
            return Ok(hit);
        }

        let response = self.inner.handle(request, cancel).await?;
        self.entries
            .entry(request.clone())
            .or_insert_with(|| response.clone());
        Ok(response)
    }
}
