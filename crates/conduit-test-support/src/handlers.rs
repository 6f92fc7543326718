//! Scripted request handlers.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use conduit_core::error::PipelineError;
use conduit_core::handler::RequestHandler;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

type Script<Req, Resp> = Box<dyn Fn(&Req) -> Result<Resp, PipelineError> + Send + Sync>;

/// A handler that answers from a closure and records every request.
pub struct ScriptedHandler<Req, Resp> {
    script: Script<Req, Resp>,
    requests: Mutex<Vec<Req>>,
    calls: AtomicUsize,
}

impl<Req, Resp> ScriptedHandler<Req, Resp>
where
    Req: Clone + Send + Sync + 'static,
    Resp: Send + 'static,
{
    /// Answers every request with `script(request)`.
    pub fn from_fn(
        script: impl Fn(&Req) -> Result<Resp, PipelineError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers every request with a clone of `result`.
    pub fn always(result: Result<Resp, PipelineError>) -> Self
    where
        Resp: Clone + Sync,
    {
        Self::from_fn(move |_| result.clone())
    }

    /// Panics on every request.
    #[must_use]
    pub fn panicking(message: &'static str) -> Self {
        Self::from_fn(move |_| panic!("{message}"))
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<Req> {
        self.requests.lock().clone()
    }

    /// Number of times the handler was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<Req, Resp> RequestHandler<Req> for ScriptedHandler<Req, Resp>
where
    Req: Clone + Send + Sync + 'static,
    Resp: Send + 'static,
{
    type Response = Resp;

    async fn handle(
        &self,
        request: &Req,
        _cancel: &CancellationToken,
    ) -> Result<Resp, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        (self.script)(request)
    }
}
