//! Fixed authorization answers and commit-lifecycle recording.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use conduit_core::access::{Authorizer, PrincipalAccessor};
use conduit_core::unit_of_work::CommitListener;
use parking_lot::Mutex;

/// An authorizer that gives the same answer for every request.
#[derive(Debug, Clone, Copy)]
pub struct StaticAuthorizer(pub bool);

impl<Req> Authorizer<Req> for StaticAuthorizer {
    fn authorize(&self, _request: &Req) -> bool {
        self.0
    }
}

/// A principal accessor returning a fixed display name.
#[derive(Debug, Clone, Default)]
pub struct StaticPrincipal(pub Option<String>);

impl StaticPrincipal {
    /// A principal named `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self(Some(name.into()))
    }
}

impl PrincipalAccessor for StaticPrincipal {
    fn display_name(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Records commit signals together with a counter observed at signal time.
///
/// Tests pass the counter they care about (for example the number of
/// publish calls) so ordering can be asserted.
#[derive(Debug)]
pub struct RecordingCommitListener {
    observed: Arc<AtomicUsize>,
    signals: Mutex<Vec<(&'static str, usize)>>,
}

impl RecordingCommitListener {
    /// Creates a listener sampling `observed` on every signal.
    #[must_use]
    pub fn new(observed: Arc<AtomicUsize>) -> Self {
        Self {
            observed,
            signals: Mutex::new(Vec::new()),
        }
    }

    /// Signals received so far, each paired with the sampled counter.
    pub fn signals(&self) -> Vec<(&'static str, usize)> {
        self.signals.lock().clone()
    }
}

impl CommitListener for RecordingCommitListener {
    fn committing(&self) {
        let sample = self.observed.load(Ordering::SeqCst);
        self.signals.lock().push(("committing", sample));
    }

    fn committed(&self) {
        let sample = self.observed.load(Ordering::SeqCst);
        self.signals.lock().push(("committed", sample));
    }
}
