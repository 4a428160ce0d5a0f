//! Ed25519 signing keys.
//!
//! Keys travel as prefixed strings (`"ed25519:<base64>"`) so the algorithm is
//! explicit on the wire, and signatures travel as base64 strings.

use base64ct::{Base64, Encoding};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::errors::CryptoError;

/// Size of Ed25519 public keys in bytes
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of Ed25519 private keys in bytes
pub const ED25519_PRIVATE_KEY_SIZE: usize = 32;

/// Size of Ed25519 signatures in bytes
pub const ED25519_SIGNATURE_SIZE: usize = 64;

const ED25519_PREFIX: &str = "ed25519";

pub(crate) fn decode_prefixed(s: &str, expected_prefix: &str) -> Result<Vec<u8>, CryptoError> {
    let (prefix, data) = s
        .split_once(':')
        .ok_or_else(|| CryptoError::InvalidKeyFormat {
            reason: "Expected 'algorithm:key' format".to_string(),
        })?;
    if prefix != expected_prefix {
        return Err(CryptoError::InvalidKeyFormat {
            reason: format!("Unknown key algorithm prefix: '{prefix}'"),
        });
    }
    Base64::decode_vec(data).map_err(|e| CryptoError::InvalidKeyFormat {
        reason: format!("Invalid base64 for key: {e}"),
    })
}

pub(crate) fn to_array<const N: usize>(bytes: Vec<u8>, what: &str) -> Result<[u8; N], CryptoError> {
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| CryptoError::InvalidKeyFormat {
            reason: format!("{what} must be {N} bytes, got {}", v.len()),
        })
}

/// Public half of a signing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Verify a base64 signature over `data`.
    pub fn verify(&self, data: &[u8], signature: &str) -> Result<(), CryptoError> {
        let sig_bytes = Base64::decode_vec(signature).map_err(|_| CryptoError::InvalidSignature)?;
        let sig_array: [u8; ED25519_SIGNATURE_SIZE] = sig_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        let sig = Signature::from_bytes(&sig_array);
        self.0
            .verify(data, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Format as `"ed25519:<base64>"`.
    pub fn to_prefixed_string(&self) -> String {
        format!(
            "{ED25519_PREFIX}:{}",
            Base64::encode_string(&self.0.to_bytes())
        )
    }

    /// Parse from `"ed25519:<base64>"`.
    pub fn from_prefixed_string(s: &str) -> Result<Self, CryptoError> {
        let bytes = decode_prefixed(s, ED25519_PREFIX)?;
        let array: [u8; ED25519_PUBLIC_KEY_SIZE] = to_array(bytes, "Ed25519 public key")?;
        VerifyingKey::from_bytes(&array)
            .map(PublicKey)
            .map_err(|e| CryptoError::InvalidKeyFormat {
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_prefixed_string())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_prefixed_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_prefixed_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Secret signing key. Zeroed on drop by `ed25519-dalek`.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey::Ed25519([REDACTED])")
    }
}

impl ZeroizeOnDrop for PrivateKey {}

impl PrivateKey {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        PrivateKey(SigningKey::generate(&mut OsRng))
    }

    /// Sign `data`, returning a base64 signature.
    pub fn sign(&self, data: &[u8]) -> String {
        let signature: Signature = self.0.sign(data);
        Base64::encode_string(&signature.to_bytes())
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Format as `"ed25519:<base64>"`, wiped from memory when dropped.
    pub fn to_prefixed_string(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.0.to_bytes());
        Zeroizing::new(format!(
            "{ED25519_PREFIX}:{}",
            Base64::encode_string(&bytes[..])
        ))
    }

    /// Parse from `"ed25519:<base64>"`.
    pub fn from_prefixed_string(s: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(decode_prefixed(s, ED25519_PREFIX)?);
        let array: [u8; ED25519_PRIVATE_KEY_SIZE] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyFormat {
                    reason: format!(
                        "Ed25519 private key must be {ED25519_PRIVATE_KEY_SIZE} bytes, got {}",
                        bytes.len()
                    ),
                })?;
        Ok(PrivateKey(SigningKey::from_bytes(&array)))
    }
}

impl Serialize for PrivateKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_prefixed_string())
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Zeroizing::new(String::deserialize(deserializer)?);
        PrivateKey::from_prefixed_string(&s).map_err(serde::de::Error::custom)
    }
}
