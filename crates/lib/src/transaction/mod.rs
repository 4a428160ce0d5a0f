//! Signed transactions and their causal order.
//!
//! A transaction is an atomic batch of [`Op`]s appended to one session. It is
//! signed by the session's agent over the CoValue id, its position and its
//! (possibly encrypted) changes, so a transaction cannot be replayed into
//! another CoValue or another slot.

pub mod ops;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use ops::{ElementId, Op};

use crate::Result;
use crate::covalue::CoreError;
use crate::crypto::{CryptoError, KeyID, KeySecret, PrivateKey};
use crate::id::{CoID, SessionID, TransactionID};

/// Total order over transactions: `madeAt`, then session id bytes, then index.
///
/// Computed from the transaction's own fields only, never from receipt time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalKey {
    pub made_at: u64,
    pub session_id: SessionID,
    pub tx_index: u64,
}

/// The payload of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "privacy", rename_all = "camelCase")]
pub enum Changes {
    /// Readable by anyone who has the transaction.
    Trusting { changes: Vec<Op> },
    /// AES-256-GCM under a group read key.
    #[serde(rename_all = "camelCase")]
    Private { key_id: KeyID, encrypted: String },
}

impl Changes {
    /// Encrypt `ops` under a read key.
    pub fn seal(ops: &[Op], key_id: KeyID, secret: &KeySecret) -> Result<Self> {
        let plaintext = serde_json::to_vec(ops)?;
        let encrypted = secret.encrypt(&plaintext)?;
        Ok(Changes::Private { key_id, encrypted })
    }

    /// The read key needed to open these changes, if any.
    pub fn key_id(&self) -> Option<&KeyID> {
        match self {
            Changes::Trusting { .. } => None,
            Changes::Private { key_id, .. } => Some(key_id),
        }
    }

    /// Decode the operations, using `secret` for private changes.
    pub fn open(&self, secret: Option<&KeySecret>) -> std::result::Result<Vec<Op>, CryptoError> {
        match (self, secret) {
            (Changes::Trusting { changes }, _) => Ok(changes.clone()),
            (Changes::Private { encrypted, .. }, Some(secret)) => {
                let plaintext = secret.decrypt(encrypted)?;
                serde_json::from_slice(&plaintext).map_err(|e| CryptoError::DecryptionFailed {
                    reason: format!("decrypted changes do not parse: {e}"),
                })
            }
            (Changes::Private { key_id, .. }, None) => Err(CryptoError::DecryptionFailed {
                reason: format!("read key {key_id} unavailable"),
            }),
        }
    }
}

/// One signed entry of a session log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub session_id: SessionID,
    pub tx_index: u64,
    pub made_at: u64,
    #[serde(rename = "encryptedChanges")]
    pub changes: Changes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    pub signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningPayload<'a> {
    co_id: &'a CoID,
    session_id: &'a SessionID,
    tx_index: u64,
    made_at: u64,
    changes: &'a Changes,
    meta: &'a Option<Value>,
}

fn signing_bytes(
    co_id: &CoID,
    session_id: &SessionID,
    tx_index: u64,
    made_at: u64,
    changes: &Changes,
    meta: &Option<Value>,
) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&SigningPayload {
        co_id,
        session_id,
        tx_index,
        made_at,
        changes,
        meta,
    })
}

impl Transaction {
    /// Build and sign a transaction.
    pub fn sign(
        co_id: &CoID,
        key: CausalKey,
        changes: Changes,
        meta: Option<Value>,
        signer: &PrivateKey,
    ) -> Result<Self> {
        let bytes = signing_bytes(co_id, &key.session_id, key.tx_index, key.made_at, &changes, &meta)?;
        Ok(Self {
            signature: signer.sign(&bytes),
            session_id: key.session_id,
            tx_index: key.tx_index,
            made_at: key.made_at,
            changes,
            meta,
        })
    }

    /// Check the signature against the key embedded in the session id.
    pub fn verify(&self, co_id: &CoID) -> std::result::Result<(), CoreError> {
        let invalid = || CoreError::SignatureInvalid {
            session: self.session_id.clone(),
            tx_index: self.tx_index,
        };
        let signer = self.session_id.agent().signer().map_err(|_| invalid())?;
        let bytes = signing_bytes(
            co_id,
            &self.session_id,
            self.tx_index,
            self.made_at,
            &self.changes,
            &self.meta,
        )
        .map_err(|_| invalid())?;
        signer.verify(&bytes, &self.signature).map_err(|_| invalid())
    }

    /// Position in the total order.
    pub fn causal_key(&self) -> CausalKey {
        CausalKey {
            made_at: self.made_at,
            session_id: self.session_id.clone(),
            tx_index: self.tx_index,
        }
    }

    /// Address of this transaction.
    pub fn id(&self) -> TransactionID {
        TransactionID {
            session_id: self.session_id.clone(),
            tx_index: self.tx_index,
        }
    }
}

/// A transaction as it travels between replicas, tagged with its CoValue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub co_id: CoID,
    #[serde(flatten)]
    pub transaction: Transaction,
}
