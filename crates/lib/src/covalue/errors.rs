//! Error types for the merge engine.

use thiserror::Error;

use crate::id::{CoID, SessionID};

/// Errors raised while building or extending a CoValue's verified state.
///
/// Signature and conflict errors concern a single transaction and are handled
/// where they occur. Header and id errors make the CoValue unusable and are
/// surfaced to whoever asked for it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// The header failed structural validation.
    #[error("Corrupt header: {reason}")]
    CorruptHeader { reason: String },

    /// A header does not hash to the id it was delivered under.
    #[error("CoValue id mismatch: expected {expected}, header hashes to {actual}")]
    IdMismatch { expected: CoID, actual: CoID },

    /// A transaction's signature did not verify against its session's agent.
    #[error("Invalid signature on {session}#{tx_index}")]
    SignatureInvalid { session: SessionID, tx_index: u64 },

    /// A second, different transaction claimed an occupied slot.
    #[error("Conflicting transaction at {session}#{tx_index}")]
    ConflictingTransaction { session: SessionID, tx_index: u64 },

    /// A transaction arrived too far ahead of its session's next index to buffer.
    #[error("Transaction {session}#{tx_index} is too far ahead of expected index {expected}")]
    GapTooLarge {
        session: SessionID,
        tx_index: u64,
        expected: u64,
    },
}

impl CoreError {
    /// Check if this error is a header failure.
    pub fn is_corrupt_header(&self) -> bool {
        matches!(self, CoreError::CorruptHeader { .. })
    }

    /// Check if this error is a signature failure.
    pub fn is_signature_invalid(&self) -> bool {
        matches!(self, CoreError::SignatureInvalid { .. })
    }

    /// Check if this error is an equivocating writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CoreError::ConflictingTransaction { .. })
    }

    /// Check if this error is a transaction too far ahead to buffer.
    pub fn is_gap_too_large(&self) -> bool {
        matches!(self, CoreError::GapTooLarge { .. })
    }

    /// Check if this error leaves the whole CoValue unusable.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CoreError::CorruptHeader { .. } | CoreError::IdMismatch { .. }
        )
    }
}

impl From<CoreError> for crate::Error {
    fn from(err: CoreError) -> Self {
        crate::Error::Core(err)
    }
}
