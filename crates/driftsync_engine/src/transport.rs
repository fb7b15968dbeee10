//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use driftsync_protocol::{PullRequest, PullResult, PushRequest, PushResult};
use std::sync::Mutex;

/// A sync transport handles communication with the sync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
pub trait SyncTransport: Send + Sync {
    /// Pushes a batch of local changes for an entity type.
    fn push_changes(&self, entity_type: &str, request: &PushRequest) -> SyncResult<PushResult>;

    /// Pulls server changes for an entity type.
    fn pull_changes(&self, entity_type: &str, request: &PullRequest) -> SyncResult<PullResult>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

/// A mock transport for testing.
///
/// Responses are queued and consumed in order; when the queue is empty
/// the last set response is repeated.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: std::sync::atomic::AtomicBool,
    push_responses: Mutex<Vec<PushResult>>,
    pull_responses: Mutex<Vec<PullResult>>,
    pushed: Mutex<Vec<PushRequest>>,
    pulled: Mutex<Vec<PullRequest>>,
}

impl MockTransport {
    /// Creates a connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: std::sync::atomic::AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues a push response.
    pub fn enqueue_push_response(&self, response: PushResult) {
        self.push_responses.lock().unwrap().push(response);
    }

    /// Queues a pull response.
    pub fn enqueue_pull_response(&self, response: PullResult) {
        self.pull_responses.lock().unwrap().push(response);
    }

    /// Returns the push requests seen so far.
    pub fn pushed_requests(&self) -> Vec<PushRequest> {
        self.pushed.lock().unwrap().clone()
    }

    /// Returns the pull requests seen so far.
    pub fn pulled_requests(&self) -> Vec<PullRequest> {
        self.pulled.lock().unwrap().clone()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected
            .store(connected, std::sync::atomic::Ordering::SeqCst);
    }
}

impl SyncTransport for MockTransport {
    fn push_changes(&self, _entity_type: &str, request: &PushRequest) -> SyncResult<PushResult> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.pushed.lock().unwrap().push(request.clone());
        let mut responses = self.push_responses.lock().unwrap();
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else {
            responses
                .first()
                .cloned()
                .ok_or_else(|| SyncError::Protocol("no mock push response set".into()))
        }
    }

    fn pull_changes(&self, _entity_type: &str, request: &PullRequest) -> SyncResult<PullResult> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        self.pulled.lock().unwrap().push(request.clone());
        let mut responses = self.pull_responses.lock().unwrap();
        if responses.len() > 1 {
            Ok(responses.remove(0))
        } else {
            responses
                .first()
                .cloned()
                .ok_or_else(|| SyncError::Protocol("no mock pull response set".into()))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}
