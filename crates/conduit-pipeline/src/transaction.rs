//! Transactional stage with post-commit follow-ups.
//!
//! The handler runs inside a unit of work. On success the unit is committed,
//! the post-commit handlers run in registration order and the unit is
//! committed again to persist whatever they changed. Any failure after
//! `begin`, including a panic in the handler, a post-commit handler or either
//! commit, reverts the unit exactly once.

use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use conduit_core::publish::TriggerContext;
use conduit_core::unit_of_work::{PostCommitHandler, UnitOfWork, UnitOfWorkProvider};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{ensure_active, panic_message};

/// Runs its inner handler inside a unit of work.
pub struct TransactionHandler<H, Req, Resp> {
    inner: H,
    units: Arc<dyn UnitOfWorkProvider>,
    post_commit: Vec<Arc<dyn PostCommitHandler<Req, Resp>>>,
}

impl<H, Req, Resp> TransactionHandler<H, Req, Resp> {
    /// Wraps `inner` with units of work opened by `units`.
    pub fn new(inner: H, units: Arc<dyn UnitOfWorkProvider>) -> Self {
        Self {
            inner,
            units,
            post_commit: Vec::new(),
        }
    }

    /// Appends a handler run after the first commit.
    #[must_use]
    pub fn with_post_commit(mut self, handler: Arc<dyn PostCommitHandler<Req, Resp>>) -> Self {
        self.post_commit.push(handler);
        self
    }
}

/// An open unit of work that remembers whether it was already reverted.
struct Scope {
    unit: Box<dyn UnitOfWork>,
    reverted: bool,
}

impl Scope {
    /// Reverts once and reports the error the caller should see.
    ///
    /// A failing revert replaces `cause`, since the store may now hold
    /// partial changes.
    async fn abandon<Req: Debug>(
        &mut self,
        request: &Req,
        cause: PipelineError,
        cancel: &CancellationToken,
    ) -> PipelineError {
        if self.reverted {
            return cause;
        }
        self.reverted = true;
        match self.unit.revert(cancel).await {
            Ok(()) => {
                warn!(
                    request = std::any::type_name::<Req>(),
                    error = %cause,
                    "unit of work reverted"
                );
                cause
            }
            Err(revert_error) => {
                error!(
                    severity = "critical",
                    request = ?request,
                    original_error = %cause,
                    revert_error = %revert_error,
                    "revert failed; store may hold partial changes"
                );
                revert_error
            }
        }
    }
}

/// Runs `step`, converting a panic into a fault so the unit can be reverted.
async fn guarded<T, F>(step: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    match AssertUnwindSafe(step).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(PipelineError::fault(anyhow!(
            "panicked inside unit of work: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

#[async_trait]
impl<H, Req, Resp> RequestHandler<Req> for TransactionHandler<H, Req, Resp>
where
    Req: Debug + Send + Sync,
    Resp: Send + Sync,
    H: RequestHandler<Req, Response = Resp>,
{
    type Response = Resp;

    async fn handle(&self, request: &Req, cancel: &CancellationToken) -> Result<Resp, PipelineError> {
        ensure_active(cancel)?;
        let mut scope = Scope {
            unit: self
                .units
                .begin(&TriggerContext::for_request::<Req>(), cancel)
                .await?,
            reverted: false,
        };

        let response = match guarded(self.inner.handle(request, cancel)).await {
            Ok(response) => response,
            Err(cause) => return Err(scope.abandon(request, cause, cancel).await),
        };

        if let Err(cause) = guarded(scope.unit.commit(cancel)).await {
            return Err(scope.abandon(request, cause, cancel).await);
        }

        for handler in &self.post_commit {
            if let Err(cause) = guarded(handler.handle(request, &response, cancel)).await {
                return Err(scope.abandon(request, cause, cancel).await);
            }
        }

        if let Err(cause) = guarded(scope.unit.commit(cancel)).await {
            return Err(scope.abandon(request, cause, cancel).await);
        }

        debug!(
            request = std::any::type_name::<Req>(),
            post_commit = self.post_commit.len(),
            "unit of work committed"
        );
        Ok(response)
    }
}
