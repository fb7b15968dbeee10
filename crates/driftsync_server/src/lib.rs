//! # DriftSync Server
//!
//! Authoritative-side components of the DriftSync protocol.
//!
//! This crate provides:
//! - `Reconciler` applying client change batches (create/update/delete
//!   with last-writer-wins by logical timestamp)
//! - `ChangeFeed` answering "what changed since timestamp T"
//! - `TombstoneLog` propagating deletions without retaining payloads
//! - `AuthoritativeStore` trait plus an in-memory implementation
//! - HMAC session tokens resolving to owner ids
//! - `SyncServer`, a facade dispatching per entity type
//!
//! ## Key invariants
//!
//! - Every change in a batch is processed independently; one failure
//!   never aborts the batch
//! - Updates apply only when the pushed `lastModified` is strictly
//!   newer than the stored one
//! - Every server-side delete appends exactly one tombstone
//! - Owner mismatch on server-id lookups behaves like "not found"

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod error;
mod feed;
mod reconciler;
mod server;
mod store;
mod tombstone;

pub use auth::{AuthConfig, TokenAuthority};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use feed::ChangeFeed;
pub use reconciler::Reconciler;
pub use server::SyncServer;
pub use store::{AuthoritativeStore, MemoryStore, StoreQuery};
pub use tombstone::{Tombstone, TombstoneLog};
