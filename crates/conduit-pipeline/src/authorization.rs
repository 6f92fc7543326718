//! Capability check ahead of validation and handling.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_core::access::{Authorizer, PrincipalAccessor};
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ensure_active;

/// Name reported when no principal is authenticated.
pub const ANONYMOUS: &str = "Anonymous";

/// Rejects requests the current principal may not perform.
pub struct AuthorizationHandler<H, Req> {
    inner: H,
    authorizer: Arc<dyn Authorizer<Req>>,
    principal: Arc<dyn PrincipalAccessor>,
}

impl<H, Req> AuthorizationHandler<H, Req> {
    /// Wraps `inner`, asking `authorizer` about each request made by `principal`.
    pub fn new(
        inner: H,
        authorizer: Arc<dyn Authorizer<Req>>,
        principal: Arc<dyn PrincipalAccessor>,
    ) -> Self {
        Self {
            inner,
            authorizer,
            principal,
        }
    }
}

#[async_trait]
impl<H, Req> RequestHandler<Req> for AuthorizationHandler<H, Req>
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
        ensure_active(cancel)?;
        if !self.authorizer.authorize(request) {
            let principal = self
                .principal
                .display_name()
                .unwrap_or_else(|| ANONYMOUS.to_owned());
            info!(
                principal = %principal,
                request = std::any::type_name::<Req>(),
                "authorization denied"
            );
            return Err(PipelineError::PermissionDenied { principal });
        }
        self.inner.handle(request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use conduit_logging::entry::Severity;
    use conduit_test_support::{ScriptedHandler, StaticAuthorizer, StaticPrincipal};

    use super::*;
    use crate::log_capture::LogCapture;

    #[tokio::test]
    async fn test_denied_anonymous_request_never_reaches_handler() {
        // Arrange
        let inner = Arc::new(ScriptedHandler::<u32, u32>::always(Ok(1)));
        let handler: AuthorizationHandler<_, u32> = AuthorizationHandler::new(
            Arc::clone(&inner),
            Arc::new(StaticAuthorizer(false)),
            Arc::new(StaticPrincipal(None)),
        );

        // Act
        let result = handler.handle(&9, &CancellationToken::new()).await;

        // Assert
        assert_eq!(
            result,
            Err(PipelineError::PermissionDenied {
                principal: ANONYMOUS.to_owned()
            })
        );
        assert_eq!(inner.calls(), 0);
    }

    #[tokio::test]
    async fn test_denied_request_names_the_principal() {
        let inner = Arc::new(ScriptedHandler::<u32, u32>::always(Ok(1)));
        let handler: AuthorizationHandler<_, u32> = AuthorizationHandler::new(
            inner,
            Arc::new(StaticAuthorizer(false)),
            Arc::new(StaticPrincipal::named("grace")),
        );

        let result = handler.handle(&9, &CancellationToken::new()).await;

        assert_eq!(
            result,
            Err(PipelineError::PermissionDenied {
                principal: "grace".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn test_authorized_request_is_handled() {
        let inner = Arc::new(ScriptedHandler::<u32, u32>::from_fn(|r| Ok(r * 3)));
        let handler: AuthorizationHandler<_, u32> = AuthorizationHandler::new(
            inner,
            Arc::new(StaticAuthorizer(true)),
            Arc::new(StaticPrincipal(None)),
        );

        let result = handler.handle(&3, &CancellationToken::new()).await;

        assert_eq!(result, Ok(9));
    }

    #[tokio::test]
    async fn test_denial_is_logged_at_info_with_principal() {
        // Arrange
        let logs = LogCapture::start();
        let anonymous: AuthorizationHandler<_, u32> = AuthorizationHandler::new(
            Arc::new(ScriptedHandler::<u32, u32>::always(Ok(1))),
            Arc::new(StaticAuthorizer(false)),
            Arc::new(StaticPrincipal(None)),
        );
        let named: AuthorizationHandler<_, u32> = AuthorizationHandler::new(
            Arc::new(ScriptedHandler::<u32, u32>::always(Ok(1))),
            Arc::new(StaticAuthorizer(false)),
            Arc::new(StaticPrincipal::named("grace")),
        );
        let cancel = CancellationToken::new();

        // Act
        let _ = anonymous.handle(&9, &cancel).await;
        let _ = named.handle(&9, &cancel).await;

        // Assert
        let entries = logs.finish("authorization denied");
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|entry| entry.severity == Severity::Info));
        assert_eq!(entries[0].data["principal"], ANONYMOUS);
        assert_eq!(entries[1].data["principal"], "grace");
    }
}
