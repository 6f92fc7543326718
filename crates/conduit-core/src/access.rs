//! Validation and authorization contracts.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;

/// Checks a request before it reaches its handler.
#[async_trait]
pub trait Validator<Req>: Send + Sync
where
    Req: Send + Sync,
{
    /// Validates `request`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] listing every invalid member.
    async fn validate(&self, request: &Req, cancel: &CancellationToken) -> Result<(), PipelineError>;
}

/// Capability check for a request.
pub trait Authorizer<Req>: Send + Sync {
    /// Returns `true` if the current principal may perform `request`.
    fn authorize(&self, request: &Req) -> bool;
}

/// Exposes the principal acting in the current request.
pub trait PrincipalAccessor: Send + Sync {
    /// Display name of the principal, if one is authenticated.
    fn display_name(&self) -> Option<String>;
}

/// Principal accessor for unauthenticated contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrincipal;

impl PrincipalAccessor for NoPrincipal {
    fn display_name(&self) -> Option<String> {
        None
    }
}
