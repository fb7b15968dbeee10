//! Local replica storage.
//!
//! The engine reads and writes the device's copy of one entity type
//! through the `ReplicaStore` trait. Besides records it holds the pull
//! watermark: the server time of the last fully applied pull.

use crate::error::{SyncError, SyncResult};
use driftsync_model::{clock, id, Record, SyncStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;

/// Storage for the local copy of one entity type.
pub trait ReplicaStore: Send + Sync {
    /// Returns all local records, soft-deleted ones included.
    fn scan(&self) -> SyncResult<Vec<Record>>;

    /// Returns a record by its current id.
    fn get(&self, id: &str) -> SyncResult<Option<Record>>;

    /// Inserts or replaces a record under its current id.
    fn put(&self, record: Record) -> SyncResult<()>;

    /// Removes a record; returns true if it existed.
    fn remove(&self, id: &str) -> SyncResult<bool>;

    /// Re-keys a record from a client id to its promoted server id.
    ///
    /// The default implementation removes and re-inserts; backends with
    /// indexes may do better.
    fn rekey(&self, from: &str, to: &str) -> SyncResult<()> {
        let Some(mut record) = self.get(from)? else {
            return Ok(());
        };
        self.remove(from)?;
        record.client_id = Some(record.id.clone());
        record.id = to.to_string();
        self.put(record)
    }

    /// Returns the pull watermark, `None` before the first pull.
    fn watermark(&self) -> SyncResult<Option<i64>>;

    /// Stores the pull watermark.
    fn set_watermark(&self, watermark: i64) -> SyncResult<()>;
}

/// In-memory replica store.
#[derive(Debug, Default)]
pub struct MemoryReplica {
    records: RwLock<BTreeMap<String, Record>>,
    watermark: RwLock<Option<i64>>,
    last_client_id: Mutex<i64>,
}

impl MemoryReplica {
    /// Creates an empty replica.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record locally, keyed by a fresh client id.
    pub fn create(&self, fields: serde_json::Map<String, serde_json::Value>) -> SyncResult<Record> {
        let now = clock::now_millis();
        let mut record = Record::with_id(self.next_client_id(now), fields);
        record.mark_new(now);
        self.put(record.clone())?;
        Ok(record)
    }

    /// Applies a local edit, bumping status and timestamp.
    pub fn modify(
        &self,
        id: &str,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> SyncResult<Option<Record>> {
        let Some(mut record) = self.get(id)? else {
            return Ok(None);
        };
        record.fields = fields;
        // Fresh local creations stay NEW until the server knows them.
        if record.status != SyncStatus::New {
            record.status = SyncStatus::Modified;
        }
        record.touch(clock::now_millis());
        self.put(record.clone())?;
        Ok(Some(record))
    }

    /// Soft-deletes a record locally.
    pub fn delete(&self, id: &str) -> SyncResult<Option<Record>> {
        let Some(mut record) = self.get(id)? else {
            return Ok(None);
        };
        record.mark_deleted(clock::now_millis());
        self.put(record.clone())?;
        Ok(Some(record))
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the replica holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Issues a unique timestamp-derived client id even when two
    /// creations land in the same millisecond.
    fn next_client_id(&self, now: i64) -> String {
        let mut last = self.last_client_id.lock();
        *last = now.max(*last + 1);
        id::client_id_from_millis(*last)
    }
}

impl ReplicaStore for MemoryReplica {
    fn scan(&self) -> SyncResult<Vec<Record>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn get(&self, id: &str) -> SyncResult<Option<Record>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn put(&self, record: Record) -> SyncResult<()> {
        if record.id.is_empty() {
            return Err(SyncError::Replica("record has no id".into()));
        }
        self.records.write().insert(record.id.clone(), record);
        Ok(())
    }

    fn remove(&self, id: &str) -> SyncResult<bool> {
        Ok(self.records.write().remove(id).is_some())
    }

    fn watermark(&self) -> SyncResult<Option<i64>> {
        Ok(*self.watermark.read())
    }

    fn set_watermark(&self, watermark: i64) -> SyncResult<()> {
        *self.watermark.write() = Some(watermark);
        Ok(())
    }
}
