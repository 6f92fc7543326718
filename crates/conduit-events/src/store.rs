//! In-memory event store scoped to one causal chain.

use std::sync::Arc;

use conduit_core::clock::Clock;
use conduit_core::event::{DomainEvent, EventMetadata, EventTrackingId};
use conduit_core::id::{MetadataId, SequenceGenerator};
use conduit_core::publish::EventStore;
use parking_lot::Mutex;

/// Flat, append-only store in which every record shares one correlation id.
pub struct TrackingEventStore {
    correlation_id: MetadataId,
    sequence: Arc<dyn SequenceGenerator>,
    clock: Arc<dyn Clock>,
    records: Mutex<Vec<EventMetadata>>,
}

impl TrackingEventStore {
    /// Opens a chain, drawing its correlation id from `sequence`.
    #[must_use]
    pub fn new(sequence: Arc<dyn SequenceGenerator>, clock: Arc<dyn Clock>) -> Self {
        let correlation_id = sequence.next_id();
        Self {
            correlation_id,
            sequence,
            clock,
            records: Mutex::new(Vec::new()),
        }
    }

    /// The id shared by every record in this store.
    #[must_use]
    pub fn correlation_id(&self) -> MetadataId {
        self.correlation_id
    }

    /// The record with id `id`, if any.
    #[must_use]
    pub fn find(&self, id: MetadataId) -> Option<EventMetadata> {
        self.records.lock().iter().find(|r| r.id == id).cloned()
    }
}

impl std::fmt::Debug for TrackingEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingEventStore")
            .field("correlation_id", &self.correlation_id)
            .field("records", &self.records.lock().len())
            .finish_non_exhaustive()
    }
}

impl EventStore for TrackingEventStore {
    fn add(&self, event: &dyn DomainEvent) -> EventTrackingId {
        let tracking = EventTrackingId::new(self.sequence.next_id(), self.correlation_id);
        let record = EventMetadata::new(&tracking, event, self.clock.now());
        self.records.lock().push(record);
        tracking
    }

    fn resolve_causation(&self, id: MetadataId, cause: MetadataId) -> bool {
        let mut records = self.records.lock();
        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        let mut tracking = record.tracking_id();
        tracking.resolve_causation(cause);
        record.causation_id = tracking.causation_id();
        true
    }

    fn records(&self) -> Vec<EventMetadata> {
        self.records.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use conduit_core::id::AtomicSequence;
    use conduit_test_support::{FixedClock, NamedEvent};

    use super::*;

    fn store() -> TrackingEventStore {
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap());
        TrackingEventStore::new(Arc::new(AtomicSequence::starting_at(100)), Arc::new(clock))
    }

    #[test]
    fn test_add_assigns_fresh_ids_with_shared_correlation() {
        // Arrange
        let store = store();

        // Act
        let first = store.add(&NamedEvent::new("order.placed"));
        let second = store.add(&NamedEvent::new("order.shipped"));

        // Assert
        assert_eq!(store.correlation_id(), MetadataId::from(100));
        assert_eq!(first.id(), MetadataId::from(101));
        assert_eq!(second.id(), MetadataId::from(102));
        assert_eq!(first.correlation_id(), second.correlation_id());
        assert_eq!(second.causation_id(), store.correlation_id());

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].event_name, "order.shipped");
        assert_eq!(
            records[0].occurred_utc,
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_resolve_causation_rewrites_record() {
        let store = store();
        let cause = store.add(&NamedEvent::new("order.placed"));
        let effect = store.add(&NamedEvent::new("stock.reserved"));

        assert!(store.resolve_causation(effect.id(), cause.id()));

        let record = store.find(effect.id()).unwrap();
        assert_eq!(record.causation_id, cause.id());
    }

    #[test]
    fn test_resolve_causation_of_unknown_record_is_false() {
        let store = store();

        assert!(!store.resolve_causation(MetadataId::from(9), MetadataId::from(1)));
    }
}
