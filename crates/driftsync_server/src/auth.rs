//! Token-based authentication using HMAC-SHA256.
//!
//! Tokens resolve to an owner id; every push and pull is scoped to the
//! owner its token names.
//!
//! ## Token Format
//!
//! - 8 bytes: issue timestamp (Unix millis, big-endian)
//! - 32 bytes: HMAC-SHA256 over timestamp and owner id
//! - remainder: owner id, UTF-8

use crate::error::{ServerError, ServerResult};
use driftsync_model::clock;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const HEADER_LEN: usize = 8 + 32;

/// Authentication configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token expiration duration.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates a new auth configuration with a 24 hour expiry.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Sets the token expiration duration.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

/// Issues and validates owner-scoped tokens.
#[derive(Clone)]
pub struct TokenAuthority {
    config: AuthConfig,
}

impl TokenAuthority {
    /// Creates a new token authority.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues a token for an owner, stamped with the current time.
    pub fn issue(&self, owner_id: &str) -> Vec<u8> {
        self.issue_at(owner_id, clock::now_millis())
    }

    /// Issues a token with an explicit issue timestamp.
    pub fn issue_at(&self, owner_id: &str, timestamp: i64) -> Vec<u8> {
        let mut signed = timestamp.to_be_bytes().to_vec();
        signed.extend_from_slice(owner_id.as_bytes());
        let signature = self.sign(&signed);

        let mut token = Vec::with_capacity(HEADER_LEN + owner_id.len());
        token.extend_from_slice(&timestamp.to_be_bytes());
        token.extend_from_slice(&signature);
        token.extend_from_slice(owner_id.as_bytes());
        token
    }

    /// Validates a token and returns the owner id it names.
    pub fn resolve(&self, token: &[u8]) -> ServerResult<String> {
        if token.len() <= HEADER_LEN {
            return Err(ServerError::NotAuthorized("invalid token length".into()));
        }

        let timestamp_bytes: [u8; 8] = token[0..8].try_into().unwrap();
        let signature = &token[8..HEADER_LEN];
        let owner_bytes = &token[HEADER_LEN..];

        let mut signed = timestamp_bytes.to_vec();
        signed.extend_from_slice(owner_bytes);
        if self.sign(&signed) != signature {
            return Err(ServerError::NotAuthorized("invalid signature".into()));
        }

        let timestamp = i64::from_be_bytes(timestamp_bytes);
        let expiry_millis = self.config.token_expiry.as_millis() as i64;
        if clock::now_millis() > timestamp + expiry_millis {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }

        String::from_utf8(owner_bytes.to_vec())
            .map_err(|_| ServerError::NotAuthorized("owner id is not valid UTF-8".into()))
    }

    fn sign(&self, data: &[u8]) -> [u8; 32] {
        let mut mac =
            HmacSha256::new_from_slice(&self.config.secret).expect("HMAC can take key of any size");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}
