//! Metadata identifiers and the injected sequence that produces them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque 64-bit identifier for tracked events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataId(u64);

impl MetadataId {
    /// Returns the primitive form.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for MetadataId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<MetadataId> for u64 {
    fn from(id: MetadataId) -> Self {
        id.0
    }
}

impl fmt::Display for MetadataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Source of fresh metadata identifiers.
///
/// Injected wherever ids are minted so tests and replays stay deterministic.
pub trait SequenceGenerator: Send + Sync {
    /// Returns the next identifier. Never returns the same id twice.
    fn next_id(&self) -> MetadataId;
}

/// Lock-free monotonically increasing sequence.
#[derive(Debug)]
pub struct AtomicSequence {
    next: AtomicU64,
}

impl AtomicSequence {
    /// Creates a sequence whose first id is `start`.
    #[must_use]
    pub const fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl Default for AtomicSequence {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl SequenceGenerator for AtomicSequence {
    fn next_id(&self) -> MetadataId {
        MetadataId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_sequence_is_monotonic() {
        let sequence = AtomicSequence::starting_at(10);

        let first = sequence.next_id();
        let second = sequence.next_id();

        assert_eq!(u64::from(first), 10);
        assert_eq!(second.get(), 11);
        assert!(first < second);
    }

    #[test]
    fn test_metadata_id_serializes_as_number() {
        let id = MetadataId::from(42);

        assert_eq!(serde_json::to_value(id).unwrap(), serde_json::json!(42));
    }
}
