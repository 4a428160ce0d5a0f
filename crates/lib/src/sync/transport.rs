//! Transport abstraction for sync communication.
//!
//! The engine does not open connections itself. A host hands
//! [`Node::sync`](crate::Node::sync) something implementing
//! [`SyncTransport`]; on the other end the peer answers with
//! [`Node::handle_sync_request`](crate::Node::handle_sync_request).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use super::error::SyncError;
use super::protocol::{SyncRequest, SyncResponse};
use crate::Node;

/// Request/response connectivity to one peer.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Stable identifier of the peer, used to remember sync progress.
    fn peer_id(&self) -> &str;

    /// Deliver `request` and wait for the answer.
    ///
    /// Return [`SyncError::Network`] for failures worth retrying.
    async fn send(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError>;
}

/// Transport to another node in the same process.
///
/// Messages still pass through JSON in both directions so the wire encoding
/// is exercised exactly as over a network.
#[derive(Debug)]
pub struct LocalTransport {
    peer: Node,
    peer_id: String,
    online: AtomicBool,
    requests: AtomicUsize,
}

impl LocalTransport {
    pub fn new(peer: Node) -> Self {
        let peer_id = format!("local:{}", peer.device_id());
        Self {
            peer,
            peer_id,
            online: AtomicBool::new(true),
            requests: AtomicUsize::new(0),
        }
    }

    /// Simulate the peer going away or coming back.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    /// Requests attempted so far, including failed ones.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }
}

fn reencode<T: Serialize + DeserializeOwned>(message: &T) -> Result<T, SyncError> {
    let wire =
        serde_json::to_string(message).map_err(|e| SyncError::Serialization(e.to_string()))?;
    serde_json::from_str(&wire).map_err(|e| SyncError::Serialization(e.to_string()))
}

#[async_trait]
impl SyncTransport for LocalTransport {
    fn peer_id(&self) -> &str {
        &self.peer_id
    }

    async fn send(&self, request: &SyncRequest) -> Result<SyncResponse, SyncError> {
        self.requests.fetch_add(1, Ordering::AcqRel);
        if !self.online.load(Ordering::Acquire) {
            return Err(SyncError::Network(format!("{} is offline", self.peer_id)));
        }
        let request = reencode(request)?;
        let response = self
            .peer
            .handle_sync_request(request)
            .map_err(|err| SyncError::Remote {
                reason: err.to_string(),
            })?;
        reencode(&response)
    }
}
