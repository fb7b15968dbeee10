//! Append-only deletion log.
//!
//! Deleted records leave no payload behind; only their id and the time
//! of deletion survive, so replicas that sync later can drop their
//! local copies. Entries are immutable once appended and are never
//! garbage-collected.

use driftsync_model::clock;
use parking_lot::RwLock;

/// A single deletion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    /// The entity type the deleted record belonged to.
    pub entity_type: String,
    /// The deleted record's server id.
    pub entity_id: String,
    /// When the deletion was applied, in UTC milliseconds.
    pub timestamp: i64,
}

/// Append-only, in-memory log of deletions across all entity types.
#[derive(Debug, Default)]
pub struct TombstoneLog {
    entries: RwLock<Vec<Tombstone>>,
}

impl TombstoneLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a deletion marker stamped with the current time and
    /// returns it.
    pub fn record(&self, entity_type: &str, entity_id: &str) -> Tombstone {
        self.record_at(entity_type, entity_id, clock::now_millis())
    }

    /// Appends a deletion marker with an explicit timestamp.
    pub fn record_at(&self, entity_type: &str, entity_id: &str, timestamp: i64) -> Tombstone {
        let entry = Tombstone {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            timestamp,
        };
        self.entries.write().push(entry.clone());
        entry
    }

    /// Returns deletions of the given type strictly newer than `since`;
    /// `None` returns all of them.
    pub fn deletions_since(&self, entity_type: &str, since: Option<i64>) -> Vec<Tombstone> {
        self.entries
            .read()
            .iter()
            .filter(|t| t.entity_type == entity_type)
            .filter(|t| since.is_none_or(|s| t.timestamp > s))
            .cloned()
            .collect()
    }

    /// Returns the total number of entries across all types.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no deletions have been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_by_type_and_watermark() {
        let log = TombstoneLog::new();
        log.record_at("todo", "srv1", 100);
        log.record_at("todo", "srv2", 200);
        log.record_at("note", "srv3", 300);

        let all = log.deletions_since("todo", None);
        assert_eq!(all.len(), 2);

        // Boundary is exclusive.
        let newer = log.deletions_since("todo", Some(100));
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].entity_id, "srv2");

        assert!(log.deletions_since("todo", Some(200)).is_empty());
        assert_eq!(log.deletions_since("note", Some(0)).len(), 1);
    }

    #[test]
    fn entries_accumulate() {
        let log = TombstoneLog::new();
        assert!(log.is_empty());

        log.record("todo", "srv1");
        log.record("todo", "srv1");
        assert_eq!(log.len(), 2);
    }
}
