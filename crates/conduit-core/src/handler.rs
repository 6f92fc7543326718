//! The request handler contract.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// A single operation taking a typed request to a typed response.
///
/// Business handlers and every decorator wrapping them implement this trait,
/// so stages compose freely.
#[async_trait]
pub trait RequestHandler<Req>: Send + Sync
where
    Req: Send + Sync,
{
    /// The success payload.
    type Response: Send;

    /// Handles `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] for expected failures, or a
    /// [`PipelineError::Fault`] for unexpected ones.
    async fn handle(
        &self,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<Self::Response, PipelineError>;
}

#[async_trait]
impl<Req, H> RequestHandler<Req> for Arc<H>
where
    Req: Send + Sync,
    H: RequestHandler<Req> + ?Sized,
{
    type Response = H::Response;

    async fn handle(
        &self,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<Self::Response, PipelineError> {
        (**self).handle(request, cancel).await
    }
}

/// A shared, type-erased pipeline for one request/response pair.
pub type SharedHandler<Req, Resp> = Arc<dyn RequestHandler<Req, Response = Resp>>;

/// Identifies a request/response pair.
///
/// Equality and hashing consider only the two types; the names are kept for
/// display.
#[derive(Debug, Clone, Copy)]
pub struct RequestMetadata {
    request_type: TypeId,
    response_type: TypeId,
    request_name: &'static str,
    response_name: &'static str,
}

impl RequestMetadata {
    /// Metadata for requests of type `Req` answered with `Resp`.
    #[must_use]
    pub fn of<Req: 'static, Resp: 'static>() -> Self {
        Self {
            request_type: TypeId::of::<Req>(),
            response_type: TypeId::of::<Resp>(),
            request_name: type_name::<Req>(),
            response_name: type_name::<Resp>(),
        }
    }

    /// Fully qualified request type name.
    #[must_use]
    pub fn request_name(&self) -> &'static str {
        self.request_name
    }

    /// Fully qualified response type name.
    #[must_use]
    pub fn response_name(&self) -> &'static str {
        self.response_name
    }
}

impl PartialEq for RequestMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.request_type == other.request_type && self.response_type == other.response_type
    }
}

impl Eq for RequestMetadata {}

impl Hash for RequestMetadata {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.request_type.hash(state);
        self.response_type.hash(state);
    }
}

impl fmt::Display for RequestMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.request_name, self.response_name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    struct Ping;
    struct Echo;

    #[async_trait]
    impl RequestHandler<String> for Echo {
        type Response = String;

        async fn handle(
            &self,
            request: &String,
            _cancel: &CancellationToken,
        ) -> Result<String, PipelineError> {
            Ok(request.clone())
        }
    }

    #[test]
    fn test_metadata_equality_considers_both_types() {
        let a = RequestMetadata::of::<Ping, u32>();
        let b = RequestMetadata::of::<Ping, u32>();
        let c = RequestMetadata::of::<Ping, u64>();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let catalog: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn test_shared_handler_delegates() {
        let handler: SharedHandler<String, String> = Arc::new(Echo);

        let response = handler
            .handle(&"hello".to_owned(), &CancellationToken::new())
            .await;

        assert_eq!(response, Ok("hello".to_owned()));
    }
}
