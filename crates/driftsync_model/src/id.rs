//! Record identity classification and generation.
//!
//! A record is identified either by a *server id* (opaque, assigned by
//! the authoritative store) or by a *client id* (generated locally
//! before the server has acknowledged the record). Client ids are
//! 13-digit millisecond-timestamp strings, so the two kinds can be told
//! apart without extra bookkeeping.

use crate::clock;

/// Number of digits in a client-generated id.
pub const CLIENT_ID_DIGITS: usize = 13;

/// Returns true if `id` was generated on a client.
///
/// A client id is either empty (never assigned) or exactly 13 ASCII
/// digits, the shape of a millisecond timestamp.
pub fn is_client_id(id: &str) -> bool {
    id.is_empty() || (id.len() == CLIENT_ID_DIGITS && id.bytes().all(|b| b.is_ascii_digit()))
}

/// Generates a client id from an explicit millisecond timestamp.
pub fn client_id_from_millis(millis: i64) -> String {
    format!("{:0width$}", millis.max(0), width = CLIENT_ID_DIGITS)
}

/// Generates a client id from the current wall clock.
pub fn client_id_now() -> String {
    client_id_from_millis(clock::now_millis())
}

/// Generates a fresh server id.
///
/// Server ids are opaque; the only guarantee is that they never look
/// like a client id.
pub fn server_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_id_is_client_id() {
        assert!(is_client_id(""));
    }

    #[test]
    fn timestamp_shaped_id_is_client_id() {
        assert!(is_client_id("1699999999999"));
        assert!(is_client_id(&client_id_now()));
    }

    #[test]
    fn server_shaped_ids_are_not_client_ids() {
        assert!(!is_client_id("srv1"));
        assert!(!is_client_id(&server_id()));
        // 13 characters but not all digits
        assert!(!is_client_id("169999999999x"));
        // Wrong length
        assert!(!is_client_id("1699"));
        assert!(!is_client_id("16999999999990"));
    }

    proptest! {
        #[test]
        fn generated_client_ids_classify_as_client(millis in 0i64..=9_999_999_999_999) {
            prop_assert!(is_client_id(&client_id_from_millis(millis)));
        }

        #[test]
        fn generated_server_ids_never_classify_as_client(_seed in 0u8..32) {
            prop_assert!(!is_client_id(&server_id()));
        }
    }
}
