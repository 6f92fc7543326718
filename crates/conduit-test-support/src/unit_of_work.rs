//! Test units of work and persistence sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use conduit_core::aggregate::AggregateRoot;
use conduit_core::error::PipelineError;
use conduit_core::publish::TriggerContext;
use conduit_core::unit_of_work::{ChangeSet, SessionSource, UnitOfWork, UnitOfWorkProvider};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Failures a [`RecordingUnitOfWorkProvider`] should inject.
#[derive(Debug, Clone, Default)]
pub struct UnitOfWorkScript {
    /// Returned from `begin`.
    pub begin_error: Option<PipelineError>,
    /// Returned from the commit calls with these 1-based positions.
    pub failing_commits: Vec<(usize, PipelineError)>,
    /// The 1-based commit position that panics with this message.
    pub panicking_commit: Option<(usize, &'static str)>,
    /// Returned from every `revert`.
    pub revert_error: Option<PipelineError>,
}

/// A provider that logs every transactional call in order.
///
/// The log holds `"begin"`, `"commit"` and `"revert"` entries across all
/// units of work the provider opened.
#[derive(Debug, Default)]
pub struct RecordingUnitOfWorkProvider {
    script: UnitOfWorkScript,
    log: Arc<Mutex<Vec<&'static str>>>,
    triggers: Mutex<Vec<&'static str>>,
}

impl RecordingUnitOfWorkProvider {
    /// A provider where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider injecting the failures in `script`.
    #[must_use]
    pub fn scripted(script: UnitOfWorkScript) -> Self {
        Self {
            script,
            log: Arc::default(),
            triggers: Mutex::default(),
        }
    }

    /// Calls made so far.
    pub fn log(&self) -> Vec<&'static str> {
        self.log.lock().clone()
    }

    /// Request type names passed to `begin`, in order.
    pub fn triggers(&self) -> Vec<&'static str> {
        self.triggers.lock().clone()
    }

    /// Number of log entries equal to `call`.
    pub fn count(&self, call: &str) -> usize {
        self.log.lock().iter().filter(|c| **c == call).count()
    }
}

#[async_trait]
impl UnitOfWorkProvider for RecordingUnitOfWorkProvider {
    async fn begin(
        &self,
        trigger: &TriggerContext,
        _cancel: &CancellationToken,
    ) -> Result<Box<dyn UnitOfWork>, PipelineError> {
        self.log.lock().push("begin");
        self.triggers.lock().push(trigger.request_type());
        if let Some(error) = &self.script.begin_error {
            return Err(error.clone());
        }
        Ok(Box::new(RecordingUnitOfWork {
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            commits: 0,
        }))
    }
}

struct RecordingUnitOfWork {
    script: UnitOfWorkScript,
    log: Arc<Mutex<Vec<&'static str>>>,
    commits: usize,
}

#[async_trait]
impl UnitOfWork for RecordingUnitOfWork {
    async fn commit(&mut self, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.log.lock().push("commit");
        self.commits += 1;
        if let Some((position, message)) = self.script.panicking_commit
            && position == self.commits
        {
            panic!("{message}");
        }
        match self
            .script
            .failing_commits
            .iter()
            .find(|(position, _)| *position == self.commits)
        {
            Some((_, error)) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn revert(&mut self, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.log.lock().push("revert");
        match &self.script.revert_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct ChangeSetState {
    aggregates: Mutex<Vec<Arc<dyn AggregateRoot>>>,
    save_error: Mutex<Option<PipelineError>>,
    saves: AtomicUsize,
    discards: AtomicUsize,
}

/// A persistence session kept in memory; cloning shares the session.
#[derive(Clone, Default)]
pub struct InMemoryChangeSet {
    state: Arc<ChangeSetState>,
}

impl InMemoryChangeSet {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `aggregate`.
    pub fn track(&self, aggregate: Arc<dyn AggregateRoot>) {
        self.state.aggregates.lock().push(aggregate);
    }

    /// Makes every subsequent save fail with `error`.
    pub fn fail_saves_with(&self, error: PipelineError) {
        *self.state.save_error.lock() = Some(error);
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.state.saves.load(Ordering::SeqCst)
    }

    /// Number of discards.
    pub fn discards(&self) -> usize {
        self.state.discards.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeSet for InMemoryChangeSet {
    async fn save_changes(&self, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        if let Some(error) = self.state.save_error.lock().clone() {
            return Err(error);
        }
        self.state.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn discard_changes(&self, _cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.state.discards.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn tracked_aggregates(&self) -> Vec<Arc<dyn AggregateRoot>> {
        self.state.aggregates.lock().clone()
    }
}

#[async_trait]
impl SessionSource for InMemoryChangeSet {
    async fn open(&self, _cancel: &CancellationToken) -> Result<Arc<dyn ChangeSet>, PipelineError> {
        Ok(Arc::new(self.clone()))
    }
}
