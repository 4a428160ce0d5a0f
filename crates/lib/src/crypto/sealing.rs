//! Asymmetric sealing to one or more X25519 recipients.
//!
//! A sealed payload is encrypted once under a random content key; the content
//! key is then wrapped for each recipient with a key derived (HKDF-SHA256) from
//! an ephemeral X25519 agreement. Only holders of a listed sealer secret can
//! open it.

use std::collections::BTreeMap;

use base64ct::{Base64, Encoding};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

use super::cipher::{KEY_LENGTH, aead_decrypt, aead_encrypt};
use super::errors::CryptoError;
use super::signing::{decode_prefixed, to_array};

const X25519_PREFIX: &str = "x25519";
const SEAL_INFO: &[u8] = b"covalent seal v1";

/// Public half of a sealing keypair.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SealerPublic(X25519Public);

impl std::fmt::Debug for SealerPublic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SealerPublic({})", self.to_prefixed_string())
    }
}

impl SealerPublic {
    /// Format as `"x25519:<base64>"`.
    pub fn to_prefixed_string(&self) -> String {
        format!("{X25519_PREFIX}:{}", Base64::encode_string(self.0.as_bytes()))
    }

    /// Parse from `"x25519:<base64>"`.
    pub fn from_prefixed_string(s: &str) -> Result<Self, CryptoError> {
        let bytes = decode_prefixed(s, X25519_PREFIX)?;
        let array: [u8; 32] = to_array(bytes, "X25519 public key")?;
        Ok(SealerPublic(X25519Public::from(array)))
    }
}

impl std::fmt::Display for SealerPublic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_prefixed_string())
    }
}

impl Serialize for SealerPublic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_prefixed_string())
    }
}

impl<'de> Deserialize<'de> for SealerPublic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SealerPublic::from_prefixed_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Secret half of a sealing keypair. Zeroed on drop by `x25519-dalek`.
#[derive(Clone)]
pub struct SealerSecret(StaticSecret);

impl std::fmt::Debug for SealerSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealerSecret::X25519([REDACTED])")
    }
}

impl SealerSecret {
    /// Generate a fresh secret from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut bytes[..]);
        SealerSecret(StaticSecret::from(*bytes))
    }

    /// The matching public key.
    pub fn public_key(&self) -> SealerPublic {
        SealerPublic(X25519Public::from(&self.0))
    }

    /// Format as `"x25519:<base64>"`, wiped from memory when dropped.
    pub fn to_prefixed_string(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.0.to_bytes());
        Zeroizing::new(format!(
            "{X25519_PREFIX}:{}",
            Base64::encode_string(&bytes[..])
        ))
    }

    /// Parse from `"x25519:<base64>"`.
    pub fn from_prefixed_string(s: &str) -> Result<Self, CryptoError> {
        let bytes = decode_prefixed(s, X25519_PREFIX)?;
        let array: Zeroizing<[u8; 32]> = Zeroizing::new(to_array(bytes, "X25519 secret key")?);
        Ok(SealerSecret(StaticSecret::from(*array)))
    }
}

impl Serialize for SealerSecret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_prefixed_string())
    }
}

impl<'de> Deserialize<'de> for SealerSecret {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Zeroizing::new(String::deserialize(deserializer)?);
        SealerSecret::from_prefixed_string(&s).map_err(serde::de::Error::custom)
    }
}

/// A payload sealed to a fixed set of recipients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sealed {
    /// Ephemeral public key of the sealer, shared by all recipients.
    pub ephemeral: SealerPublic,
    /// Wrapped content key per recipient, keyed by the recipient's prefixed public key.
    pub recipients: BTreeMap<String, String>,
    /// `base64(nonce || ciphertext)` of the payload under the content key.
    pub ciphertext: String,
}

impl Sealed {
    /// Whether `recipient` can open this payload.
    pub fn is_sealed_for(&self, recipient: &SealerPublic) -> bool {
        self.recipients.contains_key(&recipient.to_prefixed_string())
    }
}

fn wrapping_key(
    shared: &[u8; 32],
    ephemeral: &SealerPublic,
    recipient: &SealerPublic,
) -> Result<Zeroizing<[u8; KEY_LENGTH]>, CryptoError> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral.0.as_bytes());
    salt[32..].copy_from_slice(recipient.0.as_bytes());

    let hk = Hkdf::<Sha256>::new(Some(&salt[..]), shared);
    let mut okm = Zeroizing::new([0u8; KEY_LENGTH]);
    hk.expand(SEAL_INFO, &mut okm[..])
        .map_err(|e| CryptoError::KeyDerivationFailed {
            reason: e.to_string(),
        })?;
    Ok(okm)
}

/// Seal `payload` so that any of `recipients` can open it.
pub fn seal(payload: &[u8], recipients: &[SealerPublic]) -> Result<Sealed, CryptoError> {
    if recipients.is_empty() {
        return Err(CryptoError::EncryptionFailed {
            reason: "Cannot seal to an empty recipient set".to_string(),
        });
    }

    let mut content_key = Zeroizing::new([0u8; KEY_LENGTH]);
    rand::rngs::OsRng.fill_bytes(&mut content_key[..]);
    let ciphertext = Base64::encode_string(&aead_encrypt(&content_key[..], payload)?);

    let ephemeral_secret = SealerSecret::generate();
    let ephemeral = ephemeral_secret.public_key();

    let mut wrapped = BTreeMap::new();
    for recipient in recipients {
        let shared = ephemeral_secret.0.diffie_hellman(&recipient.0);
        let kek = wrapping_key(shared.as_bytes(), &ephemeral, recipient)?;
        let wrapped_key = aead_encrypt(&kek[..], &content_key[..])?;
        wrapped.insert(
            recipient.to_prefixed_string(),
            Base64::encode_string(&wrapped_key),
        );
    }

    Ok(Sealed {
        ephemeral,
        recipients: wrapped,
        ciphertext,
    })
}

/// Open a sealed payload with one recipient's secret.
pub fn unseal(sealed: &Sealed, secret: &SealerSecret) -> Result<Vec<u8>, CryptoError> {
    let me = secret.public_key();
    let wrapped = sealed
        .recipients
        .get(&me.to_prefixed_string())
        .ok_or(CryptoError::NotARecipient)?;
    let wrapped = Base64::decode_vec(wrapped).map_err(|e| CryptoError::DecryptionFailed {
        reason: format!("Invalid base64 for wrapped key: {e}"),
    })?;

    let shared = secret.0.diffie_hellman(&sealed.ephemeral.0);
    let kek = wrapping_key(shared.as_bytes(), &sealed.ephemeral, &me)?;
    let content_key = Zeroizing::new(aead_decrypt(&kek[..], &wrapped)?);

    let ciphertext =
        Base64::decode_vec(&sealed.ciphertext).map_err(|e| CryptoError::DecryptionFailed {
            reason: format!("Invalid base64 for ciphertext: {e}"),
        })?;
    aead_decrypt(&content_key, &ciphertext)
}
