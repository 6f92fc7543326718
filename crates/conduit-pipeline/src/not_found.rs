//! Turns an absent lookup result into [`PipelineError::NotFound`].

use std::marker::PhantomData;

use async_trait::async_trait;
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ensure_active;

/// Adapts a handler answering `Option<T>` into one answering `T`.
pub struct NotFoundHandler<H, T> {
    inner: H,
    _value: PhantomData<fn() -> T>,
}

impl<H, T> NotFoundHandler<H, T> {
    /// Wraps `inner`.
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            _value: PhantomData,
        }
    }
}

/// Unqualified name of `T`, used as the missing resource's name.
fn resource_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_owned()
}

#[async_trait]
impl<Req, H, T> RequestHandler<Req> for NotFoundHandler<H, T>
where
    Req: Send + Sync,
    T: Send,
    H: RequestHandler<Req, Response = Option<T>>,
{
    type Response = T;

    async fn handle(&self, request: &Req, cancel: &CancellationToken) -> Result<T, PipelineError> {
        ensure_active(cancel)?;
        match self.inner.handle(request, cancel).await? {
            Some(value) => Ok(value),
            None => {
                let resource = resource_name::<T>();
                debug!(resource = %resource, "lookup returned nothing");
                Err(PipelineError::NotFound { resource })
            }
        }
    }
}
