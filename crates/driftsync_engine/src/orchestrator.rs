//! The sync cycle state machine.
//!
//! One cycle is push-then-pull: local changes go up first so the
//! server can reconcile them, then the replica catches up with the
//! server's view and advances its watermark. The watermark written is
//! the pull's issue time, not the newest pulled timestamp, so records
//! written by skewed clocks are never skipped.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconciler::{
    apply_server_changes, collect_local_changes, mark_local_changes_synced,
};
use crate::replica::ReplicaStore;
use crate::transport::SyncTransport;
use driftsync_protocol::{PullRequest, PushOptions, PushRequest};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The current state of the sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No sync in progress.
    Idle,
    /// Gathering dirty records from the replica.
    CollectingLocal,
    /// Sending local changes to the server.
    Pushing,
    /// Folding push acknowledgments into the replica.
    ApplyingPushResult,
    /// Fetching server changes.
    Pulling,
    /// Applying pulled changes and advancing the watermark.
    ApplyingPullResult,
    /// The last cycle failed.
    Failed,
}

impl SyncState {
    /// Returns true if a sync cycle is in progress.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle | SyncState::Failed)
    }

    /// Returns true if a new cycle can start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Failed)
    }
}

/// Statistics across sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed cycles.
    pub cycles_completed: u64,
    /// Changes pushed.
    pub records_pushed: u64,
    /// Server changes applied.
    pub records_pulled: u64,
    /// Local records purged after hopeless rejections.
    pub records_purged: u64,
    /// Retries performed.
    pub retries: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of one successful sync cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Local changes pushed.
    pub pushed: usize,
    /// Creations promoted to server ids.
    pub promoted: usize,
    /// Records purged locally: hopeless rejections plus deletes the
    /// server never saw.
    pub purged: usize,
    /// Push rejections that kept their local record for the next
    /// cycle.
    pub conflicts: usize,
    /// Server records applied (created or updated locally).
    pub pulled: usize,
    /// Tombstoned records removed locally.
    pub pulled_deleted: usize,
    /// Pulled changes refused because the local copy is not older.
    pub refused: usize,
    /// The watermark after the cycle.
    pub watermark: i64,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
}

/// Runs sync cycles for one entity type against one replica.
pub struct SyncOrchestrator<T: SyncTransport, R: ReplicaStore> {
    config: SyncConfig,
    transport: Arc<T>,
    replica: Arc<R>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

impl<T: SyncTransport, R: ReplicaStore> SyncOrchestrator<T, R> {
    /// Creates a new orchestrator.
    pub fn new(config: SyncConfig, transport: Arc<T>, replica: Arc<R>) -> Self {
        Self {
            config,
            transport,
            replica,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the replica this orchestrator syncs.
    pub fn replica(&self) -> &Arc<R> {
        &self.replica
    }

    /// Cancels the ongoing sync cycle.
    ///
    /// Cancellation takes effect between steps; whatever was already
    /// applied stays applied, and the watermark only advances when the
    /// pull was applied completely.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Performs one sync cycle: push, then pull.
    ///
    /// Cycles are single-flight: a call while another is in progress
    /// fails with `InvalidStateTransition` instead of running a second
    /// cycle against the same watermark.
    pub fn sync(&self) -> SyncResult<SyncReport> {
        let start = Instant::now();

        // Claim the cycle under one write guard so two callers cannot
        // both observe an idle state.
        {
            let mut state = self.state.write();
            if !state.can_start_sync() {
                return Err(SyncError::InvalidStateTransition {
                    from: format!("{:?}", *state),
                    to: "sync".into(),
                });
            }
            *state = SyncState::CollectingLocal;
        }
        self.cancelled.store(false, Ordering::SeqCst);

        match self.run_cycle(start) {
            Ok(report) => {
                self.set_state(SyncState::Idle);
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.records_pushed += report.pushed as u64;
                stats.records_pulled += (report.pulled + report.pulled_deleted) as u64;
                stats.records_purged += report.purged as u64;
                stats.last_error = None;
                drop(stats);
                info!(
                    entity_type = %self.config.entity_type,
                    pushed = report.pushed,
                    pulled = report.pulled,
                    watermark = report.watermark,
                    "sync cycle complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(SyncState::Failed);
                self.stats.write().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Performs a sync with retry on transient errors.
    pub fn sync_with_retry(&self) -> SyncResult<SyncReport> {
        let retry = self.config.retry.clone();
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                std::thread::sleep(retry.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }

            match self.sync() {
                Ok(report) => return Ok(report),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry.max_attempts {
                        debug!(attempt, error = %e, "sync attempt failed, retrying");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::Protocol("no sync attempts made".into())))
    }

    fn run_cycle(&self, start: Instant) -> SyncResult<SyncReport> {
        self.set_state(SyncState::CollectingLocal);
        let collected = collect_local_changes(self.replica.as_ref())?;
        self.check_cancelled()?;

        let mut promoted = 0;
        let mut purged = collected.purged;
        let mut conflicts = 0;
        let pushed = collected.records.len();
        let options = PushOptions {
            force_creation_if_not_found: self.config.force_creation_if_not_found,
        };

        for chunk in collected.records.chunks(self.config.push_batch_size.max(1)) {
            self.set_state(SyncState::Pushing);
            let request = PushRequest::new(chunk.to_vec(), options);
            let result = self
                .transport
                .push_changes(&self.config.entity_type, &request)?;

            self.set_state(SyncState::ApplyingPushResult);
            let outcome = mark_local_changes_synced(self.replica.as_ref(), &result)?;
            promoted += outcome.promoted;
            purged += outcome.purged;
            conflicts += outcome.conflicts;

            self.check_cancelled()?;
        }

        self.set_state(SyncState::Pulling);
        let request = PullRequest {
            since: self.replica.watermark()?,
            fields: self.config.pull_fields.clone(),
        };
        let result = self
            .transport
            .pull_changes(&self.config.entity_type, &request)?;

        // A cancel landing here leaves the watermark untouched; the
        // next cycle re-pulls the same window.
        self.check_cancelled()?;

        self.set_state(SyncState::ApplyingPullResult);
        let outcome = apply_server_changes(self.replica.as_ref(), &result)?;
        self.replica.set_watermark(result.server_time)?;

        Ok(SyncReport {
            pushed,
            promoted,
            purged,
            conflicts,
            pulled: outcome.created + outcome.updated,
            pulled_deleted: outcome.deleted,
            refused: outcome.rejected.len(),
            watermark: result.server_time,
            duration: start.elapsed(),
        })
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }
}
