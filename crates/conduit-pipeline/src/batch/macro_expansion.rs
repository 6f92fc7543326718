//! Expands one macro request into a batch of concrete requests.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::batch::BatchMacroExpander;
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ensure_active;

/// Runs a batch pipeline over the requests a macro stands for.
pub struct MacroHandler<H, M, Req> {
    inner: H,
    expander: Arc<dyn BatchMacroExpander<M, Req>>,
}

impl<H, M, Req> MacroHandler<H, M, Req> {
    /// Wraps the batch handler `inner`, expanding macros with `expander`.
    pub fn new(inner: H, expander: Arc<dyn BatchMacroExpander<M, Req>>) -> Self {
        Self { inner, expander }
    }
}

#[async_trait]
impl<H, M, Req> RequestHandler<M> for MacroHandler<H, M, Req>
where
    M: Send + Sync,
    Req: Send + Sync,
    H: RequestHandler<Vec<Req>>,
{
    type Response = H::Response;

    async fn handle(&self, request: &M, cancel: &CancellationToken) -> Result<H::Response, PipelineError> {
        ensure_active(cancel)?;
        let requests = self.expander.expand(request, cancel).await?;
        if requests.is_empty() {
            info!(
                request = std::any::type_name::<M>(),
                "macro matched no records"
            );
            return Err(PipelineError::NoMatchingRecords);
        }
        self.inner.handle(&requests, cancel).await
    }
}
