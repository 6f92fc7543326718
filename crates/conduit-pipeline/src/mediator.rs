//! Routes requests to the pipeline registered for their type.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use conduit_core::error::PipelineError;
use conduit_core::handler::{RequestHandler, RequestMetadata, SharedHandler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Registry of pipelines keyed by request/response pair.
///
/// Pipelines are registered while the application starts and looked up on
/// every send.
#[derive(Default)]
pub struct Mediator {
    routes: HashMap<RequestMetadata, Box<dyn Any + Send + Sync>>,
}

impl Mediator {
    /// Creates an empty mediator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the pipeline serving `Req` with `Resp`.
    ///
    /// # Panics
    ///
    /// Panics if a pipeline is already registered for the pair.
    pub fn register<Req, Resp>(&mut self, pipeline: SharedHandler<Req, Resp>) -> &mut Self
    where
        Req: Send + Sync + 'static,
        Resp: Send + 'static,
    {
        let metadata = RequestMetadata::of::<Req, Resp>();
        if self.routes.insert(metadata, Box::new(pipeline)).is_some() {
            panic!("a pipeline for {metadata} is already registered");
        }
        info!(pipeline = %metadata, "pipeline registered");
        self
    }

    /// Returns `true` if a pipeline serves `Req` with `Resp`.
    #[must_use]
    pub fn contains<Req: 'static, Resp: 'static>(&self) -> bool {
        self.routes.contains_key(&RequestMetadata::of::<Req, Resp>())
    }

    /// Every registered pair, sorted by request name.
    #[must_use]
    pub fn catalog(&self) -> Vec<RequestMetadata> {
        let mut catalog: Vec<RequestMetadata> = self.routes.keys().copied().collect();
        catalog.sort_by_key(|m| (m.request_name(), m.response_name()));
        catalog
    }

    /// Sends `request` through its pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::HandlerNotRegistered`] if no pipeline serves
    /// the pair, otherwise whatever the pipeline returns.
    #[instrument(skip_all, fields(request = std::any::type_name::<Req>()))]
    pub async fn send<Req, Resp>(
        &self,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<Resp, PipelineError>
    where
        Req: Send + Sync + 'static,
        Resp: Send + 'static,
    {
        let metadata = RequestMetadata::of::<Req, Resp>();
        let Some(pipeline) = self
            .routes
            .get(&metadata)
            .and_then(|route| route.downcast_ref::<SharedHandler<Req, Resp>>())
        else {
            debug!(pipeline = %metadata, "no pipeline registered");
            return Err(PipelineError::HandlerNotRegistered(metadata));
        };
        pipeline.handle(request, cancel).await
    }
}

impl fmt::Debug for Mediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("pipelines", &self.catalog())
            .finish()
    }
}
