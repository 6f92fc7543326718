//! Assembles decorator stages in their fixed order.
//!
//! Stages can be requested in any order; `build` always nests them the same
//! way, innermost first:
//!
//! 1. the business handler (through [`NotFoundHandler`] for lookups)
//! 2. instance cache
//! 3. transaction with post-commit handlers
//! 4. deadlock retry, so every attempt gets a fresh unit of work
//! 5. automation, after the commit
//! 6. validation
//! 7. authorization
//! 8. the error boundary
//!
//! Batch pipelines start from a singular pipeline wrapped in a batch adapter;
//! stages 2 to 5 normally belong to the singular pipeline.

use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use conduit_core::access::{Authorizer, PrincipalAccessor, Validator};
use conduit_core::batch::{BatchGrouper, BatchMacroExpander};
use conduit_core::event::EmitsEvents;
use conduit_core::handler::{RequestHandler, SharedHandler};
use conduit_core::publish::ProcessManager;
use conduit_core::unit_of_work::{PostCommitHandler, UnitOfWorkProvider};

use crate::authorization::AuthorizationHandler;
use crate::automation::AutomationHandler;
use crate::batch::{FanOutHandler, GroupingHandler, MacroHandler};
use crate::boundary::ErrorBoundary;
use crate::cache::CachingHandler;
use crate::not_found::NotFoundHandler;
use crate::retry::{DeadlockRetryHandler, DeadlockRetryPolicy};
use crate::settings::PipelineSettings;
use crate::transaction::TransactionHandler;
use crate::validation::ValidationHandler;

type Layer<Req, Resp> = Box<dyn FnOnce(SharedHandler<Req, Resp>) -> SharedHandler<Req, Resp>>;

/// Builder for the pipeline serving one request/response pair.
pub struct PipelineBuilder<Req, Resp> {
    handler: SharedHandler<Req, Resp>,
    cache: Option<Layer<Req, Resp>>,
    units: Option<Arc<dyn UnitOfWorkProvider>>,
    post_commit: Vec<Arc<dyn PostCommitHandler<Req, Resp>>>,
    retry: Option<DeadlockRetryPolicy>,
    automation: Option<Layer<Req, Resp>>,
    validators: Vec<Arc<dyn Validator<Req>>>,
    authorization: Option<(Arc<dyn Authorizer<Req>>, Arc<dyn PrincipalAccessor>)>,
}

impl<Req, Resp> PipelineBuilder<Req, Resp>
where
    Req: Debug + Send + Sync + 'static,
    Resp: Send + Sync + 'static,
{
    /// Starts a pipeline around a business handler.
    pub fn new<H>(handler: H) -> Self
    where
        H: RequestHandler<Req, Response = Resp> + 'static,
    {
        Self::from_shared(Arc::new(handler))
    }

    /// Starts a pipeline around a lookup; an absent result becomes
    /// [`PipelineError::NotFound`](conduit_core::error::PipelineError::NotFound).
    pub fn lookup<H>(handler: H) -> Self
    where
        H: RequestHandler<Req, Response = Option<Resp>> + 'static,
    {
        Self::new(NotFoundHandler::new(handler))
    }

    fn from_shared(handler: SharedHandler<Req, Resp>) -> Self {
        Self {
            handler,
            cache: None,
            units: None,
            post_commit: Vec::new(),
            retry: None,
            automation: None,
            validators: Vec::new(),
            authorization: None,
        }
    }

    /// Caches successful responses by request value.
    #[must_use]
    pub fn with_cache(mut self) -> Self
    where
        Req: Eq + Hash + Clone,
        Resp: Clone,
    {
        self.cache = Some(Box::new(
            |inner: SharedHandler<Req, Resp>| -> SharedHandler<Req, Resp> {
                Arc::new(CachingHandler::new(inner))
            },
        ));
        self
    }

    /// Runs the handler inside units of work opened by `units`.
    #[must_use]
    pub fn with_transaction(mut self, units: Arc<dyn UnitOfWorkProvider>) -> Self {
        self.units = Some(units);
        self
    }

    /// Appends a post-commit handler. Requires a transaction.
    #[must_use]
    pub fn with_post_commit(mut self, handler: Arc<dyn PostCommitHandler<Req, Resp>>) -> Self {
        self.post_commit.push(handler);
        self
    }

    /// Retries deadlocked attempts according to `policy`.
    #[must_use]
    pub fn with_deadlock_retry(mut self, policy: DeadlockRetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Retries deadlocked attempts using the policy in `settings`.
    #[must_use]
    pub fn with_settings(self, settings: &PipelineSettings) -> Self {
        self.with_deadlock_retry(settings.deadlock_retry_policy())
    }

    /// Feeds the events of each successful response to `process`.
    #[must_use]
    pub fn with_automation(mut self, process: Arc<dyn ProcessManager>) -> Self
    where
        Resp: EmitsEvents,
    {
        self.automation = Some(Box::new(
            move |inner: SharedHandler<Req, Resp>| -> SharedHandler<Req, Resp> {
                Arc::new(AutomationHandler::new(inner, process))
            },
        ));
        self
    }

    /// Adds a validator. Validators run in the order they were added.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator<Req>>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Checks each request with `authorizer` on behalf of `principal`.
    #[must_use]
    pub fn with_authorization(
        mut self,
        authorizer: Arc<dyn Authorizer<Req>>,
        principal: Arc<dyn PrincipalAccessor>,
    ) -> Self {
        self.authorization = Some((authorizer, principal));
        self
    }

    /// Nests the requested stages and returns the finished pipeline.
    ///
    /// # Panics
    ///
    /// Panics if post-commit handlers were added without a transaction.
    #[must_use]
    pub fn build(self) -> SharedHandler<Req, Resp> {
        let mut handler = self.handler;

        if let Some(layer) = self.cache {
            handler = layer(handler);
        }

        match self.units {
            Some(units) => {
                let transaction = self
                    .post_commit
                    .into_iter()
                    .fold(TransactionHandler::new(handler, units), |tx, follow_up| {
                        tx.with_post_commit(follow_up)
                    });
                handler = Arc::new(transaction);
            }
            None => assert!(
                self.post_commit.is_empty(),
                "post-commit handlers for {} need a transaction",
                std::any::type_name::<Req>()
            ),
        }

        if let Some(policy) = self.retry {
            handler = Arc::new(DeadlockRetryHandler::new(handler, policy));
        }

        if let Some(layer) = self.automation {
            handler = layer(handler);
        }

        for validator in self.validators.into_iter().rev() {
            handler = Arc::new(ValidationHandler::new(handler, validator));
        }

        if let Some((authorizer, principal)) = self.authorization {
            handler = Arc::new(AuthorizationHandler::new(handler, authorizer, principal));
        }

        Arc::new(ErrorBoundary::new(handler))
    }
}

impl<Req, Resp> PipelineBuilder<Vec<Req>, Vec<Resp>>
where
    Req: PartialEq + Debug + Send + Sync + 'static,
    Resp: Any + Send + Sync + 'static,
{
    /// Starts a batch pipeline running `singular` once per item.
    pub fn batch(singular: SharedHandler<Req, Resp>) -> Self {
        Self::new(FanOutHandler::new(singular))
    }

    /// Starts a batch pipeline that splits each batch with `grouper` and
    /// runs every group through `batch` concurrently.
    pub fn grouped(
        batch: SharedHandler<Vec<Req>, Vec<Resp>>,
        grouper: Arc<dyn BatchGrouper<Req>>,
    ) -> Self {
        Self::new(GroupingHandler::new(batch, grouper))
    }
}

impl<M, Resp> PipelineBuilder<M, Resp>
where
    M: Debug + Send + Sync + 'static,
    Resp: Send + Sync + 'static,
{
    /// Starts a pipeline that expands each macro request with `expander`
    /// and hands the concrete requests to `batch`.
    pub fn expand<Req>(
        batch: SharedHandler<Vec<Req>, Resp>,
        expander: Arc<dyn BatchMacroExpander<M, Req>>,
    ) -> Self
    where
        Req: Send + Sync + 'static,
    {
        Self::new(MacroHandler::new(batch, expander))
    }
}
