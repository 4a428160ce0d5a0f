//! Agents and the key material the engine consumes.
//!
//! An agent is a pair of public keys: an Ed25519 key that signs transactions and
//! an X25519 key that group read keys are sealed to. The engine never derives
//! these; a [`KeyProvider`] hands them in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::constants::AGENT_SEPARATOR;
use crate::crypto::{CryptoError, KeyID, KeySecret, PrivateKey, PublicKey, SealerPublic, SealerSecret};

/// Public identity of an agent: `"ed25519:<b64>~x25519:<b64>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentID(String);

impl AgentID {
    /// Build from the two public keys.
    pub fn from_keys(signer: &PublicKey, sealer: &SealerPublic) -> Self {
        AgentID(format!(
            "{}{AGENT_SEPARATOR}{}",
            signer.to_prefixed_string(),
            sealer.to_prefixed_string()
        ))
    }

    /// Parse and validate both halves.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (signer, sealer) = s
            .split_once(AGENT_SEPARATOR)
            .ok_or_else(|| format!("agent id without '{AGENT_SEPARATOR}': {s}"))?;
        PublicKey::from_prefixed_string(signer).map_err(|e| e.to_string())?;
        SealerPublic::from_prefixed_string(sealer).map_err(|e| e.to_string())?;
        Ok(AgentID(s.to_string()))
    }

    pub(crate) fn new_unchecked(s: &str) -> Self {
        AgentID(s.to_string())
    }

    /// The key that verifies this agent's transaction signatures.
    pub fn signer(&self) -> Result<PublicKey, CryptoError> {
        let (signer, _) = self.halves()?;
        PublicKey::from_prefixed_string(signer)
    }

    /// The key group read keys are sealed to.
    pub fn sealer(&self) -> Result<SealerPublic, CryptoError> {
        let (_, sealer) = self.halves()?;
        SealerPublic::from_prefixed_string(sealer)
    }

    fn halves(&self) -> Result<(&str, &str), CryptoError> {
        self.0
            .split_once(AGENT_SEPARATOR)
            .ok_or_else(|| CryptoError::InvalidKeyFormat {
                reason: format!("agent id without '{AGENT_SEPARATOR}'"),
            })
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AgentID {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AgentID::parse(&value)
    }
}

impl From<AgentID> for String {
    fn from(id: AgentID) -> Self {
        id.0
    }
}

/// Secret half of an agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSecret {
    /// Signs transactions.
    pub signer: PrivateKey,
    /// Opens read keys sealed to this agent.
    pub sealer: SealerSecret,
}

impl AgentSecret {
    /// Fresh random keys.
    pub fn generate() -> Self {
        Self {
            signer: PrivateKey::generate(),
            sealer: SealerSecret::generate(),
        }
    }

    /// The public identity.
    pub fn agent_id(&self) -> AgentID {
        AgentID::from_keys(&self.signer.public_key(), &self.sealer.public_key())
    }
}

/// Source of the keys a node acts with.
///
/// Implemented by the host's identity layer. Read keys delivered out of band
/// (an invite link, a backup) are looked up here when a group does not carry
/// a copy sealed to this agent.
pub trait KeyProvider: Send + Sync {
    /// The agent this node writes as.
    fn agent_secret(&self) -> &AgentSecret;

    /// Stable identifier of this device or process; part of every session id.
    fn device_id(&self) -> &str;

    /// A read key the host already holds, if any.
    fn read_key(&self, key_id: &KeyID) -> Option<KeySecret>;

    /// Changes whenever [`read_key`](Self::read_key) may answer differently.
    ///
    /// Cached values decrypted without a key are rebuilt when this moves.
    /// Providers whose keys never change can keep the default.
    fn key_generation(&self) -> u64 {
        0
    }
}

/// In-memory [`KeyProvider`].
#[derive(Debug)]
pub struct LocalKeyring {
    agent: AgentSecret,
    device_id: String,
    read_keys: RwLock<HashMap<KeyID, KeySecret>>,
    generation: AtomicU64,
}

impl LocalKeyring {
    /// Keyring for `agent` on a freshly named device.
    pub fn new(agent: AgentSecret) -> Self {
        Self::with_device_id(agent, uuid::Uuid::new_v4().to_string())
    }

    /// Keyring for `agent` on a known device, so sessions resume across restarts.
    pub fn with_device_id(agent: AgentSecret, device_id: impl Into<String>) -> Self {
        Self {
            agent,
            device_id: device_id.into(),
            read_keys: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Keyring for a brand-new random agent.
    pub fn generate() -> Self {
        Self::new(AgentSecret::generate())
    }

    /// Remember a read key delivered out of band.
    pub fn insert_read_key(&self, key_id: KeyID, secret: KeySecret) {
        self.read_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key_id, secret);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl KeyProvider for LocalKeyring {
    fn agent_secret(&self) -> &AgentSecret {
        &self.agent
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn read_key(&self, key_id: &KeyID) -> Option<KeySecret> {
        self.read_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key_id)
            .cloned()
    }

    fn key_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
