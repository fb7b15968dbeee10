//! Push and pull request messages.

use driftsync_model::Record;
use serde::{Deserialize, Serialize};

/// Options controlling server-side reconciliation of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOptions {
    /// Create a record pushed with an unknown server id instead of
    /// rejecting it with `ModifiedEntityNotFound`.
    #[serde(default)]
    pub force_creation_if_not_found: bool,
}

impl PushOptions {
    /// Options that force creation of unknown server ids.
    pub fn force_creation() -> Self {
        Self {
            force_creation_if_not_found: true,
        }
    }
}

/// A batch of client-originated changes pushed to the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushRequest {
    /// Changed records, each carrying id, status, `lastModified` and
    /// arbitrary entity fields.
    pub changes: Vec<Record>,
    /// Reconciliation options.
    #[serde(default)]
    pub options: PushOptions,
}

impl PushRequest {
    /// Creates a push request.
    pub fn new(changes: Vec<Record>, options: PushOptions) -> Self {
        Self { changes, options }
    }
}

/// A request for server changes since a watermark.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Return changes with `lastModified` strictly greater than this;
    /// `None` requests a full sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    /// Restrict modified records to these payload fields; sync
    /// metadata is always included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl PullRequest {
    /// Requests changes newer than `since`.
    pub fn since(since: i64) -> Self {
        Self {
            since: Some(since),
            fields: None,
        }
    }

    /// Requests a full sync.
    pub fn full() -> Self {
        Self::default()
    }

    /// Restricts modified records to the named payload fields.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}
