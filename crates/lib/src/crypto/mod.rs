//! Cryptographic primitives: content hashing, Ed25519 signing, X25519 sealing
//! and AES-256-GCM symmetric encryption.
//!
//! The engine consumes keys; it never derives them from passwords or seeds.
//! Key material reaches it through [`crate::identity::KeyProvider`].

pub mod cipher;
pub mod errors;
pub mod sealing;
pub mod signing;

use sha2::{Digest, Sha256};

pub use cipher::{KeyID, KeySecret};
pub use errors::CryptoError;
pub use sealing::{Sealed, SealerPublic, SealerSecret, seal, unseal};
pub use signing::{PrivateKey, PublicKey};

/// SHA-256 of `bytes`, hex encoded.
pub fn hash(bytes: impl AsRef<[u8]>) -> String {
    let digest = Sha256::digest(bytes.as_ref());
    hex::encode(digest)
}

/// First `len` hex characters of [`hash`], for compact derived identifiers.
pub fn short_hash(bytes: impl AsRef<[u8]>, len: usize) -> String {
    let mut full = hash(bytes);
    full.truncate(len);
    full
}

/// Sign `payload`, returning a base64 signature.
pub fn sign(payload: &[u8], signing_key: &PrivateKey) -> String {
    signing_key.sign(payload)
}

/// Check a base64 signature. Malformed signatures are simply invalid.
pub fn verify(payload: &[u8], signature: &str, public_key: &PublicKey) -> bool {
    public_key.verify(payload, signature).is_ok()
}
