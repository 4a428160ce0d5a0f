//! The immutable header every CoValue starts from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::covalue::CoreError;
use crate::crypto::hash;
use crate::id::CoID;
use crate::identity::AgentID;

/// Which projection interprets a CoValue's transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoValueType {
    /// Last-writer-wins map.
    Map,
    /// Ordered list.
    List,
    /// Append-only stream.
    Stream,
    /// Character-level text.
    Text,
}

impl std::fmt::Display for CoValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CoValueType::Map => "map",
            CoValueType::List => "list",
            CoValueType::Stream => "stream",
            CoValueType::Text => "text",
        };
        f.write_str(name)
    }
}

/// Who may write a CoValue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Ruleset {
    /// The value is itself a group. `initial_admin` holds admin from the start.
    #[serde(rename_all = "camelCase")]
    Group { initial_admin: AgentID },
    /// Writers and admins of `group` may write; content is encrypted with the
    /// group's read key.
    OwnedByGroup { group: CoID },
    /// Only `agent` may write.
    Account { agent: AgentID },
    /// Anyone may write. Used for bootstrapping and tests.
    UnsafeAllowAll,
}

/// Flavour of a map-typed CoValue, derived from its ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapKind {
    /// Ordinary application map.
    Plain,
    /// Membership table and key distribution.
    Group,
    /// An agent's own root map.
    Account,
}

/// Immutable description of a CoValue. Its hash is the CoValue's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoValueHeader {
    /// The projection type.
    #[serde(rename = "type")]
    pub co_type: CoValueType,
    /// Write rules.
    pub ruleset: Ruleset,
    /// Free-form application tag, never interpreted here.
    pub meta: Option<Value>,
    /// Creation time in milliseconds since the Unix epoch.
    pub created_at: u64,
    /// Random seed so otherwise identical headers get distinct ids.
    pub uniqueness: String,
}

impl CoValueHeader {
    /// A header with a fresh uniqueness seed.
    pub fn new(co_type: CoValueType, ruleset: Ruleset, meta: Option<Value>, created_at: u64) -> Self {
        Self {
            co_type,
            ruleset,
            meta,
            created_at,
            uniqueness: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Content hash of the header. A pure function of the header fields.
    pub fn id(&self) -> Result<CoID, CoreError> {
        let bytes = serde_json::to_vec(self).map_err(|e| CoreError::CorruptHeader {
            reason: format!("header does not serialize: {e}"),
        })?;
        Ok(CoID::from_digest(&hash(bytes)))
    }

    /// The map flavour, if this is a map.
    pub fn map_kind(&self) -> Option<MapKind> {
        if self.co_type != CoValueType::Map {
            return None;
        }
        Some(match self.ruleset {
            Ruleset::Group { .. } => MapKind::Group,
            Ruleset::Account { .. } => MapKind::Account,
            Ruleset::OwnedByGroup { .. } | Ruleset::UnsafeAllowAll => MapKind::Plain,
        })
    }

    /// The group this value is owned by, if any.
    pub fn owner_group(&self) -> Option<&CoID> {
        match &self.ruleset {
            Ruleset::OwnedByGroup { group } => Some(group),
            _ => None,
        }
    }

    /// Whether this header describes a group.
    pub fn is_group(&self) -> bool {
        matches!(self.ruleset, Ruleset::Group { .. })
    }

    /// Structural checks. A header that fails them makes the CoValue unusable.
    pub fn validate(&self) -> Result<(), CoreError> {
        let corrupt = |reason: &str| {
            Err(CoreError::CorruptHeader {
                reason: reason.to_string(),
            })
        };
        if self.uniqueness.is_empty() {
            return corrupt("empty uniqueness seed");
        }
        match &self.ruleset {
            Ruleset::Group { .. } | Ruleset::Account { .. } if self.co_type != CoValueType::Map => {
                corrupt("group and account rulesets require a map")
            }
            Ruleset::OwnedByGroup { group } if !group.is_well_formed() => {
                corrupt("owner group id is malformed")
            }
            _ => Ok(()),
        }
    }

    /// Check that `id` really is this header's id.
    pub fn verify_id(&self, id: &CoID) -> Result<(), CoreError> {
        let actual = self.id()?;
        if &actual != id {
            return Err(CoreError::IdMismatch {
                expected: id.clone(),
                actual,
            });
        }
        Ok(())
    }
}
