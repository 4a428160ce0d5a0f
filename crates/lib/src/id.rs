//! Identifier types: CoValue ids, session ids and transaction ids.
//!
//! All of them are plain strings on the wire so they sort and compare the same
//! way on every replica; the newtypes only add validation and accessors.

use serde::{Deserialize, Serialize};

use crate::constants::{CO_ID_PREFIX, SESSION_SEPARATOR};
use crate::crypto::short_hash;
use crate::identity::AgentID;

/// Content-addressed identifier of a CoValue: `co_z<sha256 hex of the header>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoID(String);

impl CoID {
    /// Build an id from the header digest.
    pub(crate) fn from_digest(digest: &str) -> Self {
        CoID(format!("{CO_ID_PREFIX}{digest}"))
    }

    /// Wrap an id received from elsewhere. Use [`Self::is_well_formed`] to check it.
    pub fn new(s: impl Into<String>) -> Self {
        CoID(s.into())
    }

    /// Whether the id has the expected prefix and a full-length hex digest.
    pub fn is_well_formed(&self) -> bool {
        self.0
            .strip_prefix(CO_ID_PREFIX)
            .is_some_and(|digest| digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit()))
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CoID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CoID {
    fn from(s: &str) -> Self {
        CoID(s.to_string())
    }
}

impl AsRef<str> for CoID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One writer's log for one CoValue: `<agentID>_session_<16 hex>`.
///
/// The tag is derived from `(coId, agentId, deviceId)`, so the same agent on the
/// same device always resumes the same session, while another device of the
/// same agent gets its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionID(String);

impl SessionID {
    /// Derive the session for `agent` writing `co_id` from `device_id`.
    pub fn derive(co_id: &CoID, agent: &AgentID, device_id: &str) -> Self {
        let tag = short_hash(
            format!("{}\n{}\n{}", co_id.as_str(), agent.as_str(), device_id),
            16,
        );
        SessionID(format!("{}{SESSION_SEPARATOR}{tag}", agent.as_str()))
    }

    /// Parse and validate a session id string.
    pub fn parse(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        let (agent, tag) = s
            .rsplit_once(SESSION_SEPARATOR)
            .ok_or_else(|| format!("session id without '{SESSION_SEPARATOR}': {s}"))?;
        if tag.is_empty() || !tag.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("malformed session tag in {s}"));
        }
        AgentID::parse(agent)?;
        Ok(SessionID(s))
    }

    /// The agent that owns (and signs for) this session.
    pub fn agent(&self) -> AgentID {
        // Validated at construction.
        let (agent, _) = self
            .0
            .rsplit_once(SESSION_SEPARATOR)
            .unwrap_or((self.0.as_str(), ""));
        AgentID::new_unchecked(agent)
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionID {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SessionID::parse(value)
    }
}

impl From<SessionID> for String {
    fn from(id: SessionID) -> Self {
        id.0
    }
}

/// Address of one transaction: its session and position in that session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionID {
    /// The session the transaction belongs to.
    pub session_id: SessionID,
    /// Zero-based, gapless index within the session.
    pub tx_index: u64,
}

impl std::fmt::Display for TransactionID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.session_id, self.tx_index)
    }
}
