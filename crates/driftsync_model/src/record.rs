//! The synchronizable record type.

use crate::id;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Local-only sync lifecycle classification of a record.
///
/// The authoritative replica never requires this field; it describes
/// how a *local* copy relates to the server's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    /// In sync with the server.
    #[default]
    Synced,
    /// Created locally, unknown to the server.
    New,
    /// Modified locally since the last sync.
    Modified,
    /// Marked deleted locally (soft delete) or by the server feed.
    Deleted,
}

/// A synchronizable record.
///
/// Sync metadata is typed; arbitrary entity fields ride in `fields`,
/// flattened into the same JSON object on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary identity: a server id once acknowledged, a client id
    /// before that.
    #[serde(default)]
    pub id: String,
    /// The original client id, retained after server-side promotion so
    /// re-pushes of the same creation stay idempotent.
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// The authenticated principal that created the record.
    #[serde(rename = "ownerId", default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Local sync status. Defaults to `Synced` when absent on the wire.
    #[serde(default)]
    pub status: SyncStatus,
    /// Logical timestamp (UTC milliseconds) of the last mutation; the
    /// sole conflict-resolution signal.
    #[serde(rename = "lastModified", default)]
    pub last_modified: i64,
    /// Entity payload fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates a record with the given payload fields and no identity.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            id: String::new(),
            client_id: None,
            owner_id: None,
            status: SyncStatus::New,
            last_modified: 0,
            fields,
        }
    }

    /// Creates a record with an explicit id.
    pub fn with_id(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(fields)
        }
    }

    /// Returns true if the record is still identified by a client id.
    pub fn has_client_identity(&self) -> bool {
        id::is_client_id(&self.id)
    }

    /// Advances the logical timestamp for a local mutation.
    ///
    /// `last_modified` must strictly increase on every mutation that
    /// moves `status` away from `Synced`, even when the wall clock has
    /// not advanced since the previous mutation.
    pub fn touch(&mut self, now: i64) {
        self.last_modified = now.max(self.last_modified + 1);
    }

    /// Marks the record as locally created.
    pub fn mark_new(&mut self, now: i64) {
        self.status = SyncStatus::New;
        self.touch(now);
    }

    /// Marks the record as locally modified.
    pub fn mark_modified(&mut self, now: i64) {
        self.status = SyncStatus::Modified;
        self.touch(now);
    }

    /// Marks the record as locally deleted (soft delete).
    pub fn mark_deleted(&mut self, now: i64) {
        self.status = SyncStatus::Deleted;
        self.touch(now);
    }

    /// Marks the record as reconciled with the server.
    pub fn mark_synced(&mut self) {
        self.status = SyncStatus::Synced;
    }

    /// Returns a payload field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a payload field.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Overwrites the payload fields with those of `other`, leaving
    /// identity untouched.
    pub fn assign_fields(&mut self, other: &Record) {
        self.fields = other.fields.clone();
        self.last_modified = other.last_modified;
    }
}
