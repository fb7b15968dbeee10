//! Server-side application of pushed client changes.
//!
//! Each change in a batch is reconciled independently against the
//! authoritative store: client-identified records are promoted to
//! server ids, updates apply under last-writer-wins, deletes leave
//! tombstones. One change's failure never aborts the batch.

use crate::error::ServerError;
use crate::store::{AuthoritativeStore, StoreQuery};
use crate::tombstone::TombstoneLog;
use driftsync_model::{Record, SyncStatus};
use driftsync_protocol::{
    DeletedId, PushOptions, PushResult, RejectDetail, RejectReason, Rejection, SyncAck,
};
use std::sync::Arc;
use tracing::debug;

/// Applies pushed batches for one entity type.
pub struct Reconciler {
    entity_type: String,
    store: Arc<dyn AuthoritativeStore>,
    tombstones: Arc<TombstoneLog>,
}

impl Reconciler {
    /// Creates a reconciler over the given store and tombstone log.
    pub fn new(
        entity_type: impl Into<String>,
        store: Arc<dyn AuthoritativeStore>,
        tombstones: Arc<TombstoneLog>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            store,
            tombstones,
        }
    }

    /// Applies a batch of client changes on behalf of `owner_id`.
    ///
    /// Every change lands in exactly one bucket of the result. Store
    /// failures turn into `StorageFailed` rejections rather than
    /// aborting the batch.
    pub fn apply_client_changes(
        &self,
        owner_id: &str,
        changes: &[Record],
        options: &PushOptions,
    ) -> PushResult {
        let mut result = PushResult::default();
        for change in changes {
            self.apply_one(owner_id, change, options, &mut result);
        }
        debug!(
            entity_type = %self.entity_type,
            owner_id,
            created = result.created.len(),
            updated = result.updated.len(),
            deleted = result.deleted.len(),
            rejected = result.rejected.len(),
            "applied client changes"
        );
        result
    }

    fn apply_one(
        &self,
        owner_id: &str,
        change: &Record,
        options: &PushOptions,
        result: &mut PushResult,
    ) {
        match change.status {
            SyncStatus::Synced => {
                result
                    .rejected
                    .push(Rejection::new(change, RejectReason::InconsistentStatus));
            }
            SyncStatus::Deleted => self.apply_delete(owner_id, change, result),
            SyncStatus::New | SyncStatus::Modified => {
                if change.has_client_identity() {
                    self.apply_client_identified(owner_id, change, result);
                } else {
                    self.apply_server_identified(owner_id, change, options, result);
                }
            }
        }
    }

    /// A delete pushed for a server-identified record removes it and
    /// records a tombstone. Deletes of records the server no longer
    /// holds are acknowledged anyway so re-pushes stay idempotent.
    fn apply_delete(&self, owner_id: &str, change: &Record, result: &mut PushResult) {
        if change.has_client_identity() {
            result.rejected.push(Rejection::new(
                change,
                RejectReason::DeletedEntityIsClientOnly,
            ));
            return;
        }

        let query = StoreQuery::by_id(&change.id).owned_by(owner_id);
        match self.store.remove(&query) {
            Ok(removed) => {
                if removed > 0 {
                    self.tombstones.record(&self.entity_type, &change.id);
                }
                result.deleted.push(DeletedId::bare(&change.id));
            }
            Err(err) => result.rejected.push(storage_failure(change, err)),
        }
    }

    /// A change still carrying a client id is either the first push of
    /// a creation, a replay of one whose acknowledgment was lost, or a
    /// follow-up edit pushed before the id mapping arrived.
    fn apply_client_identified(&self, owner_id: &str, change: &Record, result: &mut PushResult) {
        let query = StoreQuery::by_client_id(&change.id).owned_by(owner_id);
        let stored = match self.store.find_one(&query) {
            Ok(stored) => stored,
            Err(err) => {
                result.rejected.push(storage_failure(change, err));
                return;
            }
        };

        match stored {
            None => {
                let mut record = Record::new(change.fields.clone());
                if !change.id.is_empty() {
                    record.client_id = Some(change.id.clone());
                }
                record.owner_id = Some(owner_id.to_string());
                record.status = SyncStatus::Synced;
                record.last_modified = change.last_modified;

                match self.store.save(record) {
                    Ok(saved) => result.created.push(promoted_ack(change, &saved)),
                    Err(err) => result.rejected.push(storage_failure(change, err)),
                }
            }
            Some(stored) if change.last_modified == stored.last_modified => {
                // Replay of an already promoted creation: acknowledge
                // again without writing.
                result.created.push(promoted_ack(change, &stored));
            }
            Some(mut stored) if change.last_modified > stored.last_modified => {
                stored.assign_fields(change);
                match self.store.save(stored) {
                    Ok(saved) => result.updated.push(promoted_ack(change, &saved)),
                    Err(err) => result.rejected.push(storage_failure(change, err)),
                }
            }
            Some(stored) => {
                result.rejected.push(
                    Rejection::new(change, RejectReason::ServerChangedAfterClient)
                        .with_detail(RejectDetail::server_timestamp(stored.last_modified)),
                );
            }
        }
    }

    /// An update pushed under a server id applies only when strictly
    /// newer than the stored copy.
    fn apply_server_identified(
        &self,
        owner_id: &str,
        change: &Record,
        options: &PushOptions,
        result: &mut PushResult,
    ) {
        let query = StoreQuery::by_id(&change.id).owned_by(owner_id);
        let stored = match self.store.find_one(&query) {
            Ok(stored) => stored,
            Err(err) => {
                result.rejected.push(storage_failure(change, err));
                return;
            }
        };

        match stored {
            Some(mut stored) if change.last_modified > stored.last_modified => {
                stored.assign_fields(change);
                match self.store.save(stored) {
                    Ok(_) => result.updated.push(SyncAck::from_record(change)),
                    Err(err) => result.rejected.push(storage_failure(change, err)),
                }
            }
            Some(stored) => {
                result.rejected.push(
                    Rejection::new(change, RejectReason::ServerChangedAfterClient)
                        .with_detail(RejectDetail::server_timestamp(stored.last_modified)),
                );
            }
            None if options.force_creation_if_not_found => {
                let mut record = Record::with_id(&change.id, change.fields.clone());
                record.owner_id = Some(owner_id.to_string());
                record.status = SyncStatus::Synced;
                record.last_modified = change.last_modified;

                match self.store.save(record) {
                    Ok(_) => result.created.push(SyncAck::from_record(change)),
                    Err(err) => result.rejected.push(storage_failure(change, err)),
                }
            }
            None => {
                result
                    .rejected
                    .push(Rejection::new(change, RejectReason::ModifiedEntityNotFound));
            }
        }
    }
}

/// Ack pairing the pushed client id with the stored server id so the
/// client can remap.
fn promoted_ack(change: &Record, stored: &Record) -> SyncAck {
    SyncAck {
        client_id: stored.client_id.clone(),
        id: stored.id.clone(),
        status: change.status,
        last_modified: change.last_modified,
    }
}

fn storage_failure(change: &Record, err: ServerError) -> Rejection {
    Rejection::new(change, RejectReason::StorageFailed)
        .with_detail(RejectDetail::message(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerResult;
    use crate::store::MemoryStore;
    use serde_json::{json, Map};

    fn reconciler() -> (Reconciler, Arc<MemoryStore>, Arc<TombstoneLog>) {
        let store = Arc::new(MemoryStore::new());
        let tombstones = Arc::new(TombstoneLog::new());
        let reconciler = Reconciler::new("todo", store.clone(), tombstones.clone());
        (reconciler, store, tombstones)
    }

    fn change(id: &str, status: SyncStatus, lmt: i64) -> Record {
        let mut fields = Map::new();
        fields.insert("title".into(), json!("buy milk"));
        let mut record = Record::with_id(id, fields);
        record.status = status;
        record.last_modified = lmt;
        record
    }

    #[test]
    fn creation_promotes_to_server_id() {
        let (reconciler, store, _) = reconciler();

        let result = reconciler.apply_client_changes(
            "alice",
            &[change("1699999999999", SyncStatus::New, 100)],
            &PushOptions::default(),
        );

        assert_eq!(result.created.len(), 1);
        let ack = &result.created[0];
        assert_eq!(ack.client_id.as_deref(), Some("1699999999999"));
        assert!(!ack.id.is_empty());
        assert_ne!(ack.id, "1699999999999");
        assert_eq!(ack.last_modified, 100);

        let stored = store
            .find_one(&StoreQuery::by_id(&ack.id))
            .unwrap()
            .unwrap();
        assert_eq!(stored.client_id.as_deref(), Some("1699999999999"));
        assert_eq!(stored.owner_id.as_deref(), Some("alice"));
        assert_eq!(stored.status, SyncStatus::Synced);
    }

    #[test]
    fn creation_replay_is_idempotent() {
        let (reconciler, store, _) = reconciler();
        let pushed = change("1699999999999", SyncStatus::New, 100);

        let first = reconciler.apply_client_changes("alice", &[pushed.clone()], &PushOptions::default());
        let second = reconciler.apply_client_changes("alice", &[pushed], &PushOptions::default());

        assert_eq!(second.created.len(), 1);
        assert_eq!(second.created[0].id, first.created[0].id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn client_identified_edit_after_lost_ack_updates() {
        let (reconciler, store, _) = reconciler();
        reconciler.apply_client_changes(
            "alice",
            &[change("1699999999999", SyncStatus::New, 100)],
            &PushOptions::default(),
        );

        // The client never saw the ack and edited again locally.
        let result = reconciler.apply_client_changes(
            "alice",
            &[change("1699999999999", SyncStatus::Modified, 150)],
            &PushOptions::default(),
        );

        assert_eq!(result.updated.len(), 1);
        assert!(!result.updated[0].id.is_empty());

        let stored = store
            .find_one(&StoreQuery::by_client_id("1699999999999"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.last_modified, 150);
    }

    #[test]
    fn update_applies_when_strictly_newer() {
        let (reconciler, store, _) = reconciler();
        let mut existing = change("", SyncStatus::Synced, 100);
        existing.id = "srv1".into();
        existing.owner_id = Some("alice".into());
        store.save(existing).unwrap();

        let mut pushed = change("srv1", SyncStatus::Modified, 200);
        pushed.set_field("title", json!("buy bread"));
        let result = reconciler.apply_client_changes("alice", &[pushed], &PushOptions::default());

        assert_eq!(result.updated.len(), 1);
        let stored = store.find_one(&StoreQuery::by_id("srv1")).unwrap().unwrap();
        assert_eq!(stored.last_modified, 200);
        assert_eq!(stored.field("title"), Some(&json!("buy bread")));
    }

    #[test]
    fn stale_update_rejected_with_server_timestamp() {
        let (reconciler, store, _) = reconciler();
        let mut existing = change("", SyncStatus::Synced, 200);
        existing.id = "srv1".into();
        existing.owner_id = Some("alice".into());
        store.save(existing).unwrap();

        let result = reconciler.apply_client_changes(
            "alice",
            &[change("srv1", SyncStatus::Modified, 150)],
            &PushOptions::default(),
        );

        assert_eq!(result.rejected.len(), 1);
        let rejection = &result.rejected[0];
        assert_eq!(rejection.reason, RejectReason::ServerChangedAfterClient);
        assert_eq!(rejection.detail.as_ref().unwrap().server, Some(200));

        // Server copy untouched.
        let stored = store.find_one(&StoreQuery::by_id("srv1")).unwrap().unwrap();
        assert_eq!(stored.last_modified, 200);
    }

    #[test]
    fn equal_timestamp_update_rejected() {
        let (reconciler, store, _) = reconciler();
        let mut existing = change("", SyncStatus::Synced, 200);
        existing.id = "srv1".into();
        existing.owner_id = Some("alice".into());
        store.save(existing).unwrap();

        let result = reconciler.apply_client_changes(
            "alice",
            &[change("srv1", SyncStatus::Modified, 200)],
            &PushOptions::default(),
        );

        assert_eq!(result.rejected[0].reason, RejectReason::ServerChangedAfterClient);
    }

    #[test]
    fn update_of_missing_record_rejected_unless_forced() {
        let (reconciler, store, _) = reconciler();
        let pushed = change("srv1", SyncStatus::Modified, 100);

        let result =
            reconciler.apply_client_changes("alice", &[pushed.clone()], &PushOptions::default());
        assert_eq!(result.rejected[0].reason, RejectReason::ModifiedEntityNotFound);

        let result =
            reconciler.apply_client_changes("alice", &[pushed], &PushOptions::force_creation());
        assert_eq!(result.created.len(), 1);
        assert_eq!(result.created[0].id, "srv1");
        assert!(store.find_one(&StoreQuery::by_id("srv1")).unwrap().is_some());
    }

    #[test]
    fn delete_removes_and_tombstones() {
        let (reconciler, store, tombstones) = reconciler();
        let mut existing = change("", SyncStatus::Synced, 100);
        existing.id = "srv1".into();
        existing.owner_id = Some("alice".into());
        store.save(existing).unwrap();

        let result = reconciler.apply_client_changes(
            "alice",
            &[change("srv1", SyncStatus::Deleted, 150)],
            &PushOptions::default(),
        );

        assert_eq!(result.deleted, vec![DeletedId::bare("srv1")]);
        assert!(store.is_empty());
        assert_eq!(tombstones.deletions_since("todo", None).len(), 1);
    }

    #[test]
    fn delete_of_missing_record_is_acknowledged_without_tombstone() {
        let (reconciler, _, tombstones) = reconciler();

        let result = reconciler.apply_client_changes(
            "alice",
            &[change("srv1", SyncStatus::Deleted, 150)],
            &PushOptions::default(),
        );

        assert_eq!(result.deleted, vec![DeletedId::bare("srv1")]);
        assert!(tombstones.is_empty());
    }

    #[test]
    fn delete_of_client_only_record_rejected() {
        let (reconciler, _, tombstones) = reconciler();

        let result = reconciler.apply_client_changes(
            "alice",
            &[change("1699999999999", SyncStatus::Deleted, 150)],
            &PushOptions::default(),
        );

        assert_eq!(
            result.rejected[0].reason,
            RejectReason::DeletedEntityIsClientOnly
        );
        assert!(tombstones.is_empty());
    }

    #[test]
    fn synced_status_rejected_as_inconsistent() {
        let (reconciler, _, _) = reconciler();

        let result = reconciler.apply_client_changes(
            "alice",
            &[change("srv1", SyncStatus::Synced, 100)],
            &PushOptions::default(),
        );

        assert_eq!(result.rejected[0].reason, RejectReason::InconsistentStatus);
    }

    #[test]
    fn owner_mismatch_behaves_like_not_found() {
        let (reconciler, store, _) = reconciler();
        let mut existing = change("", SyncStatus::Synced, 100);
        existing.id = "srv1".into();
        existing.owner_id = Some("bob".into());
        store.save(existing).unwrap();

        let result = reconciler.apply_client_changes(
            "alice",
            &[change("srv1", SyncStatus::Modified, 200)],
            &PushOptions::default(),
        );

        assert_eq!(result.rejected[0].reason, RejectReason::ModifiedEntityNotFound);

        // Bob's record survives a delete pushed by alice too.
        let result = reconciler.apply_client_changes(
            "alice",
            &[change("srv1", SyncStatus::Deleted, 200)],
            &PushOptions::default(),
        );
        assert_eq!(result.deleted.len(), 1);
        assert!(store.find_one(&StoreQuery::by_id("srv1")).unwrap().is_some());
    }

    #[test]
    fn batch_continues_past_failures() {
        struct FailingStore(MemoryStore);

        impl AuthoritativeStore for FailingStore {
            fn find(&self, query: &StoreQuery) -> ServerResult<Vec<Record>> {
                self.0.find(query)
            }
            fn save(&self, record: Record) -> ServerResult<Record> {
                if record.field("title") == Some(&json!("poison")) {
                    return Err(ServerError::Storage("write refused".into()));
                }
                self.0.save(record)
            }
            fn remove(&self, query: &StoreQuery) -> ServerResult<usize> {
                self.0.remove(query)
            }
        }

        let store = Arc::new(FailingStore(MemoryStore::new()));
        let tombstones = Arc::new(TombstoneLog::new());
        let reconciler = Reconciler::new("todo", store, tombstones);

        let mut poisoned = change("1690000000001", SyncStatus::New, 100);
        poisoned.set_field("title", json!("poison"));
        let healthy = change("1690000000002", SyncStatus::New, 100);

        let result = reconciler.apply_client_changes(
            "alice",
            &[poisoned, healthy],
            &PushOptions::default(),
        );

        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].reason, RejectReason::StorageFailed);
        assert_eq!(result.created.len(), 1);
        assert_eq!(result.created[0].client_id.as_deref(), Some("1690000000002"));
    }
}
