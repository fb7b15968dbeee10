//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so different
//! implementations (reqwest, ureq, a platform webview) can plug in.
//! Bodies are JSON.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use driftsync_protocol::{PullRequest, PullResult, PushRequest, PushResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body and returns the response
    /// body. Implementations must fail the call if no response arrives
    /// within `timeout`.
    fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP-based sync transport.
///
/// Posts to `{base_url}/sync/{entity_type}/push` and
/// `{base_url}/sync/{entity_type}/pull`.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    timeout: Duration,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Sets the per-request timeout; each push and pull gets its own
    /// window.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().unwrap().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write().unwrap() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write().unwrap() = None;
    }

    fn post_json<Req, Res>(&self, endpoint: &str, request: &Req) -> SyncResult<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let body = serde_json::to_vec(request)
            .map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;

        let url = format!("{}{}", self.base_url, endpoint);
        let response_body = self.client.post(&url, body, self.timeout).map_err(|e| {
            self.set_error(&e);
            self.connected.store(false, Ordering::SeqCst);
            SyncError::transport_retryable(e)
        })?;

        self.clear_error();

        serde_json::from_slice(&response_body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }
}

impl<C: HttpClient> SyncTransport for HttpTransport<C> {
    fn push_changes(&self, entity_type: &str, request: &PushRequest) -> SyncResult<PushResult> {
        self.post_json(&format!("/sync/{entity_type}/push"), request)
    }

    fn pull_changes(&self, entity_type: &str, request: &PullRequest) -> SyncResult<PullResult> {
        self.post_json(&format!("/sync/{entity_type}/pull"), request)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// A loopback HTTP client that routes requests directly to a handler.
///
/// Useful for testing without network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a loopback client over the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST request and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>, _timeout: Duration) -> Result<Vec<u8>, String> {
        let path = url.find("/sync/").map(|i| &url[i..]).unwrap_or(url);
        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestClient {
        response: RwLock<Option<Vec<u8>>>,
        healthy: AtomicBool,
    }

    impl TestClient {
        fn new() -> Self {
            Self {
                response: RwLock::new(None),
                healthy: AtomicBool::new(true),
            }
        }

        fn set_response(&self, resp: Vec<u8>) {
            *self.response.write().unwrap() = Some(resp);
        }
    }

    impl HttpClient for TestClient {
        fn post(&self, _url: &str, _body: Vec<u8>, _timeout: Duration) -> Result<Vec<u8>, String> {
            self.response
                .read()
                .unwrap()
                .clone()
                .ok_or_else(|| "no response set".into())
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn each_request_carries_the_configured_timeout() {
        struct Capture {
            seen: RwLock<Option<Duration>>,
        }

        impl HttpClient for Capture {
            fn post(&self, _url: &str, _body: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, String> {
                *self.seen.write().unwrap() = Some(timeout);
                let response = PullResult {
                    modified: vec![],
                    deleted: vec![],
                    server_time: 1,
                };
                Ok(serde_json::to_vec(&response).unwrap())
            }

            fn is_healthy(&self) -> bool {
                true
            }
        }

        let client = Capture {
            seen: RwLock::new(None),
        };
        let transport = HttpTransport::new("https://sync.example.com", client)
            .with_timeout(Duration::from_secs(5));

        transport.pull_changes("todo", &PullRequest::full()).unwrap();
        assert_eq!(
            *transport.client.seen.read().unwrap(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn transport_creation() {
        let transport = HttpTransport::new("https://sync.example.com", TestClient::new());
        assert_eq!(transport.base_url(), "https://sync.example.com");
        assert!(transport.is_connected());
    }

    #[test]
    fn transport_not_connected_error() {
        let transport = HttpTransport::new("https://sync.example.com", TestClient::new());
        transport.close().unwrap();

        let result = transport.pull_changes("todo", &PullRequest::full());
        assert!(matches!(result, Err(SyncError::NotConnected)));
    }

    #[test]
    fn transport_unhealthy_client() {
        let client = TestClient::new();
        client.healthy.store(false, Ordering::SeqCst);
        let transport = HttpTransport::new("https://sync.example.com", client);
        assert!(!transport.is_connected());
    }

    #[test]
    fn transport_decodes_pull_response() {
        let client = TestClient::new();
        let response = PullResult {
            modified: vec![],
            deleted: vec![],
            server_time: 777,
        };
        client.set_response(serde_json::to_vec(&response).unwrap());

        let transport = HttpTransport::new("https://sync.example.com", client);
        let result = transport.pull_changes("todo", &PullRequest::full()).unwrap();
        assert_eq!(result.server_time, 777);
    }

    #[test]
    fn transport_failure_is_retryable() {
        let transport = HttpTransport::new("https://sync.example.com", TestClient::new());
        let err = transport
            .pull_changes("todo", &PullRequest::full())
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.last_error().as_deref(), Some("no response set"));
        assert!(!transport.is_connected());
    }
}
