//! # DriftSync Protocol
//!
//! Wire types for the push/pull sync protocol.
//!
//! This crate provides:
//! - `PushRequest` / `PushResult` for client-to-server reconciliation
//! - `PullRequest` / `PullResult` for the server change feed
//! - `SyncAck`, `Rejection` and `RejectReason` for per-record outcomes
//!
//! Everything serializes to flat JSON field maps. This is a pure
//! protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod messages;
mod result;

pub use messages::{PullRequest, PushOptions, PushRequest};
pub use result::{DeletedId, PullResult, PushResult, RejectDetail, RejectReason, Rejection, SyncAck};
