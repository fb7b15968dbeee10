//! Authoritative record storage.
//!
//! The reconciler and change feed talk to storage through the
//! `AuthoritativeStore` trait; `MemoryStore` is the in-memory
//! implementation used by the default server and by tests.

use crate::error::{ServerError, ServerResult};
use driftsync_model::{id, Record};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Criteria for looking up records in an authoritative store.
///
/// All set criteria must match. An unset criterion matches everything.
#[derive(Debug, Clone, Default)]
pub struct StoreQuery {
    /// Match a server id exactly.
    pub id: Option<String>,
    /// Match the retained client id exactly.
    pub client_id: Option<String>,
    /// Match the owning principal exactly.
    pub owner_id: Option<String>,
    /// Match records with `lastModified` strictly greater than this.
    pub modified_after: Option<i64>,
}

impl StoreQuery {
    /// Query matching everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Query by server id.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Query by retained client id.
    pub fn by_client_id(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }

    /// Restricts matches to one owner.
    pub fn owned_by(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// Restricts matches to records newer than `timestamp`.
    pub fn modified_after(mut self, timestamp: i64) -> Self {
        self.modified_after = Some(timestamp);
        self
    }

    /// Returns true if `record` satisfies every set criterion.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(id) = &self.id {
            if record.id != *id {
                return false;
            }
        }
        if let Some(client_id) = &self.client_id {
            if record.client_id.as_deref() != Some(client_id.as_str()) {
                return false;
            }
        }
        if let Some(owner_id) = &self.owner_id {
            if record.owner_id.as_deref() != Some(owner_id.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.modified_after {
            if record.last_modified <= after {
                return false;
            }
        }
        true
    }
}

/// Storage backend holding the authoritative copy of one entity type.
///
/// Implementations must make each method atomic with respect to the
/// others; the reconciler relies on `save` observing the result of an
/// earlier `find_one` within the same push.
pub trait AuthoritativeStore: Send + Sync {
    /// Returns all records matching the query.
    fn find(&self, query: &StoreQuery) -> ServerResult<Vec<Record>>;

    /// Returns the first record matching the query, if any.
    fn find_one(&self, query: &StoreQuery) -> ServerResult<Option<Record>> {
        Ok(self.find(query)?.into_iter().next())
    }

    /// Persists a record, assigning a server id when it has none, and
    /// returns the stored copy.
    fn save(&self, record: Record) -> ServerResult<Record>;

    /// Removes all records matching the query; returns how many were
    /// removed.
    fn remove(&self, query: &StoreQuery) -> ServerResult<usize>;
}

/// In-memory authoritative store keyed by server id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Record>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl AuthoritativeStore for MemoryStore {
    fn find(&self, query: &StoreQuery) -> ServerResult<Vec<Record>> {
        let records = self.records.read();
        let mut matched: Vec<Record> = records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }

    fn save(&self, mut record: Record) -> ServerResult<Record> {
        if record.id.is_empty() {
            record.id = id::server_id();
        } else if id::is_client_id(&record.id) {
            return Err(ServerError::Storage(format!(
                "refusing to store a record under client id {}",
                record.id
            )));
        }
        self.records
            .write()
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn remove(&self, query: &StoreQuery) -> ServerResult<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| !query.matches(r));
        Ok(before - records.len())
    }
}
