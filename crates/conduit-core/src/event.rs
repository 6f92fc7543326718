//! Domain event abstractions and tracking metadata.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::MetadataId;

/// Upcast helper so dispatch tables can recover the concrete event type.
pub trait AsAny: Any {
    /// Returns `self` as [`Any`].
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Trait that all domain events implement.
pub trait DomainEvent: AsAny + Send + Sync + std::fmt::Debug {
    /// Display name used for storage and logging. Must not be empty.
    fn event_name(&self) -> &str;

    /// Serializes the event payload to JSON.
    fn to_payload(&self) -> serde_json::Value;
}

/// A published event shared between aggregates, publishers and stores.
pub type SharedEvent = Arc<dyn DomainEvent>;

/// Identity of a shared event: the address of its allocation.
///
/// Stable for as long as any clone of the [`SharedEvent`] is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKey(usize);

impl EventKey {
    /// Key for `event`.
    #[must_use]
    pub fn of(event: &SharedEvent) -> Self {
        Self(Arc::as_ptr(event).cast::<()>().addr())
    }
}

/// Responses that carry the events produced while handling a request.
pub trait EmitsEvents {
    /// The events, in the order they were raised.
    fn events(&self) -> Vec<SharedEvent>;
}

/// Lineage of one published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventTrackingId {
    id: MetadataId,
    correlation_id: MetadataId,
    causation_id: MetadataId,
}

impl EventTrackingId {
    /// Creates a tracking id whose causation defaults to the correlation.
    #[must_use]
    pub const fn new(id: MetadataId, correlation_id: MetadataId) -> Self {
        Self {
            id,
            correlation_id,
            causation_id: correlation_id,
        }
    }

    /// Unique id of the event.
    #[must_use]
    pub const fn id(&self) -> MetadataId {
        self.id
    }

    /// Id shared by every event in the causal chain.
    #[must_use]
    pub const fn correlation_id(&self) -> MetadataId {
        self.correlation_id
    }

    /// Id of the event that caused this one, or the correlation id for roots.
    #[must_use]
    pub const fn causation_id(&self) -> MetadataId {
        self.causation_id
    }

    /// Records the event that caused this one.
    ///
    /// # Panics
    ///
    /// Panics if the causation was already resolved.
    pub fn resolve_causation(&mut self, cause: MetadataId) {
        assert!(
            self.causation_id == self.correlation_id,
            "causation of event {} was already resolved",
            self.id
        );
        self.causation_id = cause;
    }
}

/// Denormalized record of a published event, as kept by an event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub id: MetadataId,
    /// Correlation ID shared across the causal chain.
    pub correlation_id: MetadataId,
    /// Causation ID linking this event to the event that caused it.
    pub causation_id: MetadataId,
    /// Display name of the event.
    pub event_name: String,
    /// Timestamp of publication.
    pub occurred_utc: DateTime<Utc>,
    /// Serialized event payload.
    pub payload: serde_json::Value,
}

impl EventMetadata {
    /// Builds the record for `event` published under `tracking`.
    ///
    /// # Panics
    ///
    /// Panics if the event's display name is empty.
    #[must_use]
    pub fn new(
        tracking: &EventTrackingId,
        event: &dyn DomainEvent,
        occurred_utc: DateTime<Utc>,
    ) -> Self {
        let event_name = event.event_name();
        assert!(
            !event_name.trim().is_empty(),
            "event {event:?} has an empty display name"
        );
        Self {
            id: tracking.id(),
            correlation_id: tracking.correlation_id(),
            causation_id: tracking.causation_id(),
            event_name: event_name.to_owned(),
            occurred_utc,
            payload: event.to_payload(),
        }
    }

    /// The tracking id this record was built from.
    #[must_use]
    pub fn tracking_id(&self) -> EventTrackingId {
        EventTrackingId {
            id: self.id,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[derive(Debug, Serialize)]
    struct Renamed {
        name: &'static str,
    }

    impl DomainEvent for Renamed {
        fn event_name(&self) -> &str {
            if self.name.is_empty() { "" } else { "customer.renamed" }
        }

        fn to_payload(&self) -> serde_json::Value {
            serde_json::json!({ "name": self.name })
        }
    }

    #[test]
    fn test_metadata_copies_tracking_and_payload() {
        // Arrange
        let mut tracking = EventTrackingId::new(MetadataId::from(5), MetadataId::from(1));
        tracking.resolve_causation(MetadataId::from(3));
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();

        // Act
        let metadata = EventMetadata::new(&tracking, &Renamed { name: "Ada" }, at);

        // Assert
        assert_eq!(metadata.id, MetadataId::from(5));
        assert_eq!(metadata.correlation_id, MetadataId::from(1));
        assert_eq!(metadata.causation_id, MetadataId::from(3));
        assert_eq!(metadata.event_name, "customer.renamed");
        assert_eq!(metadata.payload["name"], "Ada");
        assert_eq!(metadata.tracking_id(), tracking);
    }

    #[test]
    #[should_panic(expected = "empty display name")]
    fn test_metadata_rejects_unnamed_event() {
        let tracking = EventTrackingId::new(MetadataId::from(1), MetadataId::from(1));
        let _ = EventMetadata::new(&tracking, &Renamed { name: "" }, Utc::now());
    }

    #[test]
    #[should_panic(expected = "already resolved")]
    fn test_causation_resolves_once() {
        let mut tracking = EventTrackingId::new(MetadataId::from(2), MetadataId::from(1));
        tracking.resolve_causation(MetadataId::from(7));
        tracking.resolve_causation(MetadataId::from(8));
    }

    #[test]
    fn test_event_key_follows_allocation() {
        let a: SharedEvent = Arc::new(Renamed { name: "a" });
        let b: SharedEvent = Arc::new(Renamed { name: "a" });

        assert_eq!(EventKey::of(&a), EventKey::of(&a.clone()));
        assert_ne!(EventKey::of(&a), EventKey::of(&b));
    }
}
