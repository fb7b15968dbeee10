//! Server configuration.

use crate::auth::AuthConfig;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of changes accepted in a single push.
    pub max_push_batch: usize,
    /// Token authentication; `None` disables auth and treats the token
    /// string itself as the owner id.
    pub auth: Option<AuthConfig>,
}

impl ServerConfig {
    /// Creates a configuration with authentication disabled.
    pub fn new() -> Self {
        Self {
            max_push_batch: 500,
            auth: None,
        }
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }

    /// Enables HMAC token authentication.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
