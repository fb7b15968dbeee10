//! # DriftSync Engine
//!
//! Offline-first replica and sync orchestrator for DriftSync.
//!
//! This crate provides:
//! - `ReplicaStore`, the device-local copy of one entity type
//! - Client-side reconciliation (id promotion, rejection handling,
//!   last-writer-wins application of pulled changes)
//! - `SyncOrchestrator`, the push-then-pull cycle state machine
//! - Retry with exponential backoff
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! A sync cycle is **push-then-push-result-then-pull**:
//! 1. Collect dirty local records and push them
//! 2. Fold the server's acknowledgments back into the replica
//! 3. Pull server changes since the watermark and apply them
//! 4. Advance the watermark to the pull's server time
//!
//! ## Key Invariants
//!
//! - The server is authoritative; conflicts resolve by logical
//!   timestamp
//! - Local ids are promoted to server ids exactly once and the client
//!   id is retained
//! - The watermark only advances after a pull is fully applied
//! - Cancellation never leaves a half-applied pull behind a moved
//!   watermark

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod orchestrator;
mod reconciler;
mod replica;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use orchestrator::{SyncOrchestrator, SyncReport, SyncState, SyncStats};
pub use reconciler::{
    apply_server_changes, collect_local_changes, mark_local_changes_synced, ApplyOutcome,
    ApplyRejection, LocalChanges, MarkOutcome,
};
pub use replica::{MemoryReplica, ReplicaStore};
pub use transport::{MockTransport, SyncTransport};
