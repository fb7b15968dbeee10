//! # DriftSync Record Model
//!
//! Shape and lifecycle metadata for synchronizable records.
//!
//! This crate provides:
//! - `Record` with sync metadata (identity, status, logical timestamp, owner)
//! - `SyncStatus` for the local-only lifecycle classification
//! - Client/server id classification and generation
//! - Timezone-normalized millisecond clock helpers
//! - A static entity-type registry (declared codecs, no runtime
//!   prototype mutation)
//!
//! This is a pure model crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod id;
mod record;
mod registry;

pub use record::{Record, SyncStatus};
pub use registry::{EntityRegistry, EntityType};
