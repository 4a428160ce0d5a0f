//! Error types for the crypto primitives.

use thiserror::Error as ThisError;

use crate::Error;

/// Errors produced by hashing, signing, sealing and symmetric encryption.
///
/// None of these are fatal to the engine: a bad signature drops one transaction,
/// a failed decryption leaves a transaction opaque.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum CryptoError {
    /// A key string did not parse.
    #[error("Invalid key format: {reason}")]
    InvalidKeyFormat {
        /// Why the key was rejected
        reason: String,
    },

    /// A signature failed verification or was malformed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Encryption failed inside the AEAD.
    #[error("Encryption failed: {reason}")]
    EncryptionFailed {
        /// Description of the failure
        reason: String,
    },

    /// The ciphertext could not be opened with the given key.
    #[error("Decryption failed: {reason}")]
    DecryptionFailed {
        /// Description of the failure
        reason: String,
    },

    /// A sealed payload has no entry for the caller's sealer key.
    #[error("Not a recipient of this sealed payload")]
    NotARecipient,

    /// Key derivation failed.
    #[error("Key derivation failed: {reason}")]
    KeyDerivationFailed {
        /// Description of the failure
        reason: String,
    },
}

impl CryptoError {
    /// Check if this error is a signature failure.
    pub fn is_invalid_signature(&self) -> bool {
        matches!(self, CryptoError::InvalidSignature)
    }

    /// Check if this error means the payload stays unreadable for this reader.
    pub fn is_decryption_error(&self) -> bool {
        matches!(
            self,
            CryptoError::DecryptionFailed { .. } | CryptoError::NotARecipient
        )
    }

    /// Check if this error is about key material.
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidKeyFormat { .. } | CryptoError::KeyDerivationFailed { .. }
        )
    }
}

impl From<CryptoError> for Error {
    fn from(err: CryptoError) -> Self {
        Error::Crypto(err)
    }
}
