//! Error types for the synchronization module.

use thiserror::Error;

/// Errors that can occur while exchanging state with a peer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// The peer did not answer within the configured number of attempts.
    #[error("Peer {peer} unreachable after {attempts} attempts")]
    PeerUnreachable { peer: String, attempts: u32 },

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// Unexpected response type received from peer.
    #[error("Unexpected response type: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: String,
    },

    /// A message could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The peer failed to handle the request.
    #[error("Peer rejected request: {reason}")]
    Remote { reason: String },
}

impl SyncError {
    /// Check if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }

    /// Check if this is a connectivity problem.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::PeerUnreachable { .. }
        )
    }

    /// Check if the peer spoke the protocol incorrectly.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::UnexpectedResponse { .. } | SyncError::Serialization(_)
        )
    }
}

impl From<SyncError> for crate::Error {
    fn from(err: SyncError) -> Self {
        crate::Error::Sync(err)
    }
}
