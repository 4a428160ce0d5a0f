//! Storage error types.

use thiserror::Error;

use crate::id::CoID;

/// Errors raised by a [`Storage`](super::Storage) implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// A transaction was appended for a CoValue whose header was never stored.
    #[error("No header stored for {id}")]
    HeaderMissing {
        /// The CoValue the transaction belongs to.
        id: CoID,
    },

    /// A different header was stored under an existing id.
    #[error("Header for {id} differs from the one already stored")]
    HeaderCollision {
        /// The id both headers claim.
        id: CoID,
    },

    /// Serializing the stored state failed.
    #[error("Serialization failed")]
    SerializationFailed {
        #[source]
        source: serde_json::Error,
    },

    /// Deserializing the stored state failed.
    #[error("Deserialization failed")]
    DeserializationFailed {
        #[source]
        source: serde_json::Error,
    },

    /// Reading or writing the backing file failed.
    #[error("File I/O error")]
    FileIo {
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Check if this error is about a missing CoValue.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::HeaderMissing { .. })
    }

    /// Check if this error is an I/O or encoding failure.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            StorageError::FileIo { .. }
                | StorageError::SerializationFailed { .. }
                | StorageError::DeserializationFailed { .. }
        )
    }

    /// Check if this error means two headers claim one id.
    pub fn is_collision(&self) -> bool {
        matches!(self, StorageError::HeaderCollision { .. })
    }
}

impl From<StorageError> for crate::Error {
    fn from(err: StorageError) -> Self {
        crate::Error::Storage(err)
    }
}
