//! Logical clock helpers.
//!
//! All sync timestamps are UTC milliseconds since the Unix epoch. The
//! wall clock only seeds the logical clock; strict monotonicity for
//! local mutations is enforced by [`crate::Record::touch`].

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current time as UTC milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
