//! Error types for CRDT operations.
//!
//! Projections themselves never fail: operations that do not apply are ignored.
//! These errors come from turning a caller's index-based edits into operations.

use thiserror::Error;

use crate::header::CoValueType;

/// Structured error types for CRDT edits.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CRDTError {
    /// An edit for one CoValue type was applied to another.
    #[error("CRDT type mismatch: {edit} edit on a {actual}")]
    TypeMismatch {
        edit: &'static str,
        actual: CoValueType,
    },

    /// An index past the visible end of a list or text.
    #[error("Index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Invalid value provided for CRDT operation
    #[error("Invalid CRDT value: {reason}")]
    InvalidValue { reason: String },
}

impl CRDTError {
    /// Check if this error is related to type mismatches
    pub fn is_type_error(&self) -> bool {
        matches!(self, CRDTError::TypeMismatch { .. })
    }

    /// Check if this error is a bad position.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(self, CRDTError::IndexOutOfBounds { .. })
    }
}

impl From<CRDTError> for crate::Error {
    fn from(err: CRDTError) -> Self {
        crate::Error::CRDT(err)
    }
}
