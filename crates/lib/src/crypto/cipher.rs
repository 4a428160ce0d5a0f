//! Symmetric AEAD used for group read keys and as the payload cipher of sealing.
//!
//! Ciphertexts are encoded as `base64(nonce || ciphertext)` so a single string
//! can sit in a transaction or a group field.

use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, AeadCore, OsRng},
};
use base64ct::{Base64, Encoding};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::errors::CryptoError;
use crate::constants::KEY_ID_PREFIX;

/// Nonce length for AES-GCM (12 bytes standard)
pub const NONCE_LENGTH: usize = 12;

/// Key length for AES-256 (32 bytes)
pub const KEY_LENGTH: usize = 32;

/// Identifier of a group read key, e.g. `key_z1f3a9c0d2b7e6a45`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyID(String);

impl KeyID {
    /// A fresh random key id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        KeyID(format!("{KEY_ID_PREFIX}{}", hex::encode(bytes)))
    }

    /// Wrap an existing id string.
    pub fn new(s: impl Into<String>) -> Self {
        KeyID(s.into())
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KeyID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A 256-bit symmetric key. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeySecret([u8; KEY_LENGTH]);

impl std::fmt::Debug for KeySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeySecret([REDACTED])")
    }
}

impl PartialEq for KeySecret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for KeySecret {}

impl KeySecret {
    /// A fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        KeySecret(bytes)
    }

    /// Rebuild from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; KEY_LENGTH] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyFormat {
                    reason: format!("Key must be {KEY_LENGTH} bytes, got {}", bytes.len()),
                })?;
        Ok(KeySecret(array))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Encrypt and encode as `base64(nonce || ciphertext)`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let bytes = aead_encrypt(&self.0, plaintext)?;
        Ok(Base64::encode_string(&bytes))
    }

    /// Reverse of [`Self::encrypt`].
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CryptoError> {
        let bytes = Base64::decode_vec(encoded).map_err(|e| CryptoError::DecryptionFailed {
            reason: format!("Invalid base64: {e}"),
        })?;
        aead_decrypt(&self.0, &bytes)
    }

    /// Text form used when a key is stored or sealed, wiped on drop.
    pub fn to_encoded(&self) -> Zeroizing<String> {
        Zeroizing::new(Base64::encode_string(&self.0))
    }

    /// Parse the text form.
    pub fn from_encoded(s: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(Base64::decode_vec(s).map_err(|e| {
            CryptoError::InvalidKeyFormat {
                reason: format!("Invalid base64 for key: {e}"),
            }
        })?);
        Self::from_bytes(&bytes)
    }
}

/// AES-256-GCM encrypt, returning `nonce || ciphertext`.
pub(crate) fn aead_encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::EncryptionFailed {
        reason: format!("Failed to create cipher: {e}"),
    })?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext =
        cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed {
                reason: format!("Encryption failed: {e}"),
            })?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Reverse of [`aead_encrypt`].
pub(crate) fn aead_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_LENGTH {
        return Err(CryptoError::DecryptionFailed {
            reason: format!("Ciphertext shorter than nonce ({} bytes)", data.len()),
        });
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::DecryptionFailed {
        reason: format!("Failed to create cipher: {e}"),
    })?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed {
            reason: format!("Decryption failed: {e}"),
        })
}
