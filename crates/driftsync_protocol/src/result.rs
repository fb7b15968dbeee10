//! Structured outcomes of push and pull operations.

use driftsync_model::{Record, SyncStatus};
use serde::{Deserialize, Serialize};

/// Projection of a record returned in push results.
///
/// Carries just enough identity for the client to remap ids and mark
/// local copies synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAck {
    /// The original client id, when the record was client-identified.
    #[serde(rename = "clientId", default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// The record's (possibly newly assigned) server id.
    pub id: String,
    /// Status as pushed by the client.
    #[serde(default)]
    pub status: SyncStatus,
    /// The record's logical timestamp.
    #[serde(rename = "lastModified", default)]
    pub last_modified: i64,
}

impl SyncAck {
    /// Builds an ack from a record.
    pub fn from_record(record: &Record) -> Self {
        Self {
            client_id: record.client_id.clone(),
            id: record.id.clone(),
            status: record.status,
            last_modified: record.last_modified,
        }
    }
}

/// Why the server (or the client reconciler) refused a single change.
///
/// Rejections are deterministic: retrying the same payload rejects
/// again, so callers either purge, re-pull, or surface a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Update by server id found no record; it was likely deleted on
    /// the server after the client's last pull.
    ModifiedEntityNotFound,
    /// Delete pushed for a record the server never saw.
    DeletedEntityIsClientOnly,
    /// The server's copy is as new or newer than the pushed change.
    ServerChangedAfterClient,
    /// The change's status makes no sense for a push (e.g. `SYNCED`).
    InconsistentStatus,
    /// The store refused the write; other records in the batch are
    /// unaffected.
    StorageFailed,
}

/// Optional context attached to a rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectDetail {
    /// The server's current `lastModified`, attached to
    /// `ServerChangedAfterClient` so the client can re-pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<i64>,
    /// Free-form diagnostic message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RejectDetail {
    /// Detail carrying the server's current logical timestamp.
    pub fn server_timestamp(server: i64) -> Self {
        Self {
            server: Some(server),
            message: None,
        }
    }

    /// Detail carrying a diagnostic message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            server: None,
            message: Some(message.into()),
        }
    }
}

/// A single rejected change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Identity of the rejected change.
    #[serde(flatten)]
    pub ack: SyncAck,
    /// Why it was rejected.
    pub reason: RejectReason,
    /// Additional context, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<RejectDetail>,
}

impl Rejection {
    /// Builds a rejection for a record.
    pub fn new(record: &Record, reason: RejectReason) -> Self {
        Self {
            ack: SyncAck::from_record(record),
            reason,
            detail: None,
        }
    }

    /// Attaches detail to the rejection.
    pub fn with_detail(mut self, detail: RejectDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// A deleted record reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedId {
    /// The deleted record's server id.
    pub id: String,
    /// When the delete happened (present in pull results, absent in
    /// push results).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl DeletedId {
    /// Reference without a timestamp (push result entry).
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: None,
        }
    }

    /// Reference with the deletion time (pull result entry).
    pub fn at(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            timestamp: Some(timestamp),
        }
    }
}

/// Outcome of applying a pushed batch on the server.
///
/// Every change lands in exactly one bucket; one change's failure never
/// aborts the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushResult {
    /// Changes persisted as new server records, with both ids for
    /// client-side remapping.
    pub created: Vec<SyncAck>,
    /// Changes applied as updates.
    pub updated: Vec<SyncAck>,
    /// Deletes applied (tombstoned) on the server.
    pub deleted: Vec<DeletedId>,
    /// Changes refused, with reasons.
    pub rejected: Vec<Rejection>,
}

impl PushResult {
    /// Total number of changes accounted for.
    pub fn len(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len() + self.rejected.len()
    }

    /// Returns true if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Server changes since a watermark.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullResult {
    /// Live records with `lastModified` newer than the watermark.
    pub modified: Vec<Record>,
    /// Tombstoned ids newer than the watermark.
    pub deleted: Vec<DeletedId>,
    /// Server wall clock when this result was produced; the client's
    /// next watermark (issue time, not max record timestamp, to stay
    /// correct under clock skew).
    #[serde(rename = "serverTime", default)]
    pub server_time: i64,
}
