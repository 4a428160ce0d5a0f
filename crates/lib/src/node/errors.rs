//! Node error types.

use thiserror::Error;

use crate::id::CoID;

/// Errors raised by [`Node`](super::Node) operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NodeError {
    /// The CoValue is neither loaded nor stored locally.
    #[error("CoValue not found: {id}")]
    NotFound { id: CoID },

    /// Content arrived for an unknown CoValue without its header.
    #[error("Header for {id} is not available")]
    HeaderUnavailable { id: CoID },

    /// An operation that spawns tasks ran outside a Tokio runtime.
    #[error("No async runtime available")]
    NoRuntime,

    /// The node behind a weak handle has been dropped.
    #[error("Node has been dropped")]
    NodeDropped,
}

impl NodeError {
    /// Check if this error names a CoValue that is not there.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NodeError::NotFound { .. } | NodeError::HeaderUnavailable { .. }
        )
    }
}

impl From<NodeError> for crate::Error {
    fn from(err: NodeError) -> Self {
        crate::Error::Node(err)
    }
}
