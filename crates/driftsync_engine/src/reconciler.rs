//! Client-side reconciliation.
//!
//! Two halves of a sync cycle happen here: folding the server's push
//! acknowledgments back into the replica (id promotion, marking
//! synced, purging hopeless rejections) and applying pulled server
//! changes under last-writer-wins.

use crate::error::SyncResult;
use crate::replica::ReplicaStore;
use driftsync_model::{Record, SyncStatus};
use driftsync_protocol::{PullResult, PushResult, RejectReason, SyncAck};
use tracing::{debug, warn};

/// Local changes gathered for a push.
#[derive(Debug, Clone, Default)]
pub struct LocalChanges {
    /// Dirty records to push, in scan order.
    pub records: Vec<Record>,
    /// Deletes of records the server never saw, settled locally
    /// instead of pushed.
    pub purged: usize,
}

/// Gathers the local changes that need pushing: every record whose
/// status is not `Synced`.
///
/// A deleted record still under its client id never reached the
/// server, so there is nothing to push; it is removed from the replica
/// here and counted in `purged`.
pub fn collect_local_changes(replica: &dyn ReplicaStore) -> SyncResult<LocalChanges> {
    let mut collected = LocalChanges::default();
    for record in replica.scan()? {
        if record.status == SyncStatus::Synced {
            continue;
        }
        if record.status == SyncStatus::Deleted && record.has_client_identity() {
            replica.remove(&record.id)?;
            collected.purged += 1;
            continue;
        }
        collected.records.push(record);
    }
    Ok(collected)
}

/// What folding a push result into the replica did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkOutcome {
    /// Creations promoted to server ids.
    pub promoted: usize,
    /// Updates confirmed synced.
    pub confirmed: usize,
    /// Acknowledged deletes removed for good.
    pub deleted: usize,
    /// Records purged because their rejection can never succeed.
    pub purged: usize,
    /// Rejections that left the local record untouched.
    pub conflicts: usize,
}

/// Folds a push result back into the replica.
///
/// Created acknowledgments re-key the local record from its client id
/// to the assigned server id. A record is only marked `Synced` when
/// its timestamp still equals the acknowledged one; an edit that
/// landed mid-sync keeps its dirty status for the next cycle.
///
/// `ModifiedEntityNotFound` and `DeletedEntityIsClientOnly` rejections
/// purge the local record: retrying them can never succeed. All other
/// rejections leave the record in place.
pub fn mark_local_changes_synced(
    replica: &dyn ReplicaStore,
    result: &PushResult,
) -> SyncResult<MarkOutcome> {
    let mut outcome = MarkOutcome::default();

    for ack in &result.created {
        promote(replica, ack)?;
        confirm(replica, ack)?;
        outcome.promoted += 1;
    }

    for ack in &result.updated {
        // An update can still carry a client id when the promotion ack
        // of an earlier push was lost.
        promote(replica, ack)?;
        confirm(replica, ack)?;
        outcome.confirmed += 1;
    }

    for deleted in &result.deleted {
        if replica.remove(&deleted.id)? {
            outcome.deleted += 1;
        }
    }

    for rejection in &result.rejected {
        match rejection.reason {
            RejectReason::ModifiedEntityNotFound | RejectReason::DeletedEntityIsClientOnly => {
                let key = &rejection.ack.id;
                if replica.remove(key)? {
                    debug!(id = %key, reason = ?rejection.reason, "purged rejected record");
                    outcome.purged += 1;
                }
            }
            RejectReason::ServerChangedAfterClient
            | RejectReason::InconsistentStatus
            | RejectReason::StorageFailed => {
                warn!(
                    id = %rejection.ack.id,
                    reason = ?rejection.reason,
                    "push rejected, keeping local record"
                );
                outcome.conflicts += 1;
            }
        }
    }

    Ok(outcome)
}

fn promote(replica: &dyn ReplicaStore, ack: &SyncAck) -> SyncResult<()> {
    let Some(client_id) = &ack.client_id else {
        return Ok(());
    };
    if client_id == &ack.id {
        return Ok(());
    }
    if replica.get(client_id)?.is_some() {
        replica.rekey(client_id, &ack.id)?;
    }
    Ok(())
}

fn confirm(replica: &dyn ReplicaStore, ack: &SyncAck) -> SyncResult<()> {
    let Some(mut record) = replica.get(&ack.id)? else {
        return Ok(());
    };
    if record.last_modified == ack.last_modified {
        record.mark_synced();
        replica.put(record)?;
    }
    Ok(())
}

/// A pulled change the replica refused because the local copy is not
/// older. Mirrors the server's `ServerChangedAfterClient` in the other
/// direction: the client changed after the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRejection {
    /// Server id of the refused change.
    pub id: String,
    /// Timestamp of the local copy that won.
    pub local_last_modified: i64,
    /// Timestamp of the refused server change.
    pub server_last_modified: i64,
}

/// What applying a pull result to the replica did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Server records inserted locally.
    pub created: usize,
    /// Server records that replaced a local copy.
    pub updated: usize,
    /// Tombstoned records removed locally.
    pub deleted: usize,
    /// Changes refused because the local copy is not older; a pending
    /// local edit goes back to the server on the next push.
    pub rejected: Vec<ApplyRejection>,
}

/// Applies pulled server changes to the replica.
///
/// Deletions run first and are authoritative: the server decides
/// existence, so a tombstone removes the local copy even when it
/// carries a pending edit. A modified change overwrites only a
/// strictly older local copy; otherwise it is refused and reported in
/// `rejected`, leaving the local record untouched.
pub fn apply_server_changes(
    replica: &dyn ReplicaStore,
    result: &PullResult,
) -> SyncResult<ApplyOutcome> {
    let mut outcome = ApplyOutcome::default();

    for deleted in &result.deleted {
        if replica.remove(&deleted.id)? {
            outcome.deleted += 1;
        }
    }

    for server in &result.modified {
        // A pulled record can still live under its client id locally
        // when the promotion acknowledgment never arrived. The stale
        // client copy is superseded by the authoritative one.
        let local = match replica.get(&server.id)? {
            Some(local) => Some(local),
            None => {
                if let Some(client_id) = &server.client_id {
                    replica.remove(client_id)?;
                }
                None
            }
        };

        match local {
            None => {
                let mut record = server.clone();
                record.mark_synced();
                replica.put(record)?;
                outcome.created += 1;
            }
            Some(local) if local.last_modified < server.last_modified => {
                let mut record = server.clone();
                record.mark_synced();
                replica.put(record)?;
                outcome.updated += 1;
            }
            Some(local) => {
                outcome.rejected.push(ApplyRejection {
                    id: server.id.clone(),
                    local_last_modified: local.last_modified,
                    server_last_modified: server.last_modified,
                });
            }
        }
    }

    Ok(outcome)
}
