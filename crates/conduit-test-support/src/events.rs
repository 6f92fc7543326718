//! Test events, aggregates and a scripted publisher.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use conduit_core::aggregate::{AggregateRoot, EventQueue};
use conduit_core::error::PipelineError;
use conduit_core::event::{DomainEvent, EventKey, SharedEvent};
use conduit_core::publish::EventPublisher;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// An event identified only by its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEvent {
    name: String,
}

impl NamedEvent {
    /// Creates an event called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl DomainEvent for NamedEvent {
    fn event_name(&self) -> &str {
        &self.name
    }

    fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name })
    }
}

/// A bare aggregate root exposing its event queue.
#[derive(Debug)]
pub struct TestAggregate {
    id: Uuid,
    events: EventQueue,
}

impl TestAggregate {
    /// Creates an aggregate with a random id and no pending events.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            events: EventQueue::new(),
        }
    }
}

impl Default for TestAggregate {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateRoot for TestAggregate {
    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn events(&self) -> &EventQueue {
        &self.events
    }
}

type PublishHook = Box<dyn Fn(&SharedEvent) + Send + Sync>;

/// A publisher whose outcomes and failures are set up per event.
#[derive(Default)]
pub struct ScriptedPublisher {
    outcomes: Mutex<HashMap<EventKey, (SharedEvent, Vec<SharedEvent>)>>,
    failures: Mutex<HashMap<EventKey, (SharedEvent, PipelineError)>>,
    hooks: Mutex<Vec<PublishHook>>,
    published: Mutex<Vec<SharedEvent>>,
    count: Arc<AtomicUsize>,
}

impl ScriptedPublisher {
    /// Creates a publisher that returns no outcomes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishing `event` will return `outcomes`.
    pub fn produces(&self, event: &SharedEvent, outcomes: Vec<SharedEvent>) {
        self.outcomes
            .lock()
            .insert(EventKey::of(event), (Arc::clone(event), outcomes));
    }

    /// Publishing `event` will fail with `error`.
    pub fn fails_on(&self, event: &SharedEvent, error: PipelineError) {
        self.failures
            .lock()
            .insert(EventKey::of(event), (Arc::clone(event), error));
    }

    /// Runs `hook` on every published event before outcomes are returned.
    pub fn on_publish(&self, hook: impl Fn(&SharedEvent) + Send + Sync + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    /// Events published so far, in order.
    pub fn published(&self) -> Vec<SharedEvent> {
        self.published.lock().clone()
    }

    /// Counter incremented after every completed publish call.
    #[must_use]
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.count)
    }
}

#[async_trait]
impl EventPublisher for ScriptedPublisher {
    async fn publish(
        &self,
        event: SharedEvent,
        _cancel: &CancellationToken,
    ) -> Result<Vec<SharedEvent>, PipelineError> {
        let key = EventKey::of(&event);
        self.published.lock().push(Arc::clone(&event));
        if let Some((_, error)) = self.failures.lock().get(&key) {
            return Err(error.clone());
        }
        for hook in self.hooks.lock().iter() {
            hook(&event);
        }
        let outcomes = self
            .outcomes
            .lock()
            .get(&key)
            .map(|(_, outcomes)| outcomes.clone())
            .unwrap_or_default();
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(outcomes)
    }
}
