//! Roles and the per-kind capability table.
//!
//! Plain maps, groups and accounts are all maps. What differs is who may write
//! and which keys a write may touch; both live in one static table instead of
//! being spread across the projection and authorization code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{KEY_FIELD_PREFIX, READ_KEY_FIELD};
use crate::header::{CoValueHeader, MapKind};
use crate::identity::AgentID;
use crate::transaction::Op;

/// A member's standing in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Writes content and manages members and keys.
    Admin,
    /// Writes content.
    Writer,
    /// Receives read keys only.
    Reader,
    /// Former member; receives nothing.
    Revoked,
}

impl Role {
    pub fn can_write(&self) -> bool {
        matches!(self, Role::Admin | Role::Writer)
    }

    pub fn can_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Whether this member should be sent read keys.
    pub fn can_read(&self) -> bool {
        !matches!(self, Role::Revoked)
    }

    /// Parse the value stored under a member's key.
    pub fn from_value(value: &Value) -> Option<Role> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(self) -> Value {
        Value::String(self.as_str().to_string())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Writer => "writer",
            Role::Reader => "reader",
            Role::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one map kind allows.
#[derive(Debug)]
pub struct Capabilities {
    pub kind: MapKind,
    /// Roles that may write at all.
    pub write_roles: &'static [Role],
    /// Whether a write may touch `key`.
    pub accepts_key: fn(&str) -> bool,
}

impl Capabilities {
    pub fn may_write(&self, role: Option<Role>) -> bool {
        role.is_some_and(|role| self.write_roles.contains(&role))
    }

    /// Whether `op` stays within the keys this kind accepts.
    pub fn accepts(&self, op: &Op) -> bool {
        match op {
            Op::Set { key, .. } | Op::Del { key } => (self.accepts_key)(key),
            _ => true,
        }
    }
}

fn any_key(_: &str) -> bool {
    true
}

fn group_key(key: &str) -> bool {
    key == READ_KEY_FIELD || key.starts_with(KEY_FIELD_PREFIX) || AgentID::parse(key).is_ok()
}

static CAPABILITIES: [Capabilities; 3] = [
    Capabilities {
        kind: MapKind::Plain,
        write_roles: &[Role::Admin, Role::Writer],
        accepts_key: any_key,
    },
    Capabilities {
        kind: MapKind::Group,
        write_roles: &[Role::Admin],
        accepts_key: group_key,
    },
    Capabilities {
        kind: MapKind::Account,
        write_roles: &[Role::Admin],
        accepts_key: any_key,
    },
];

/// The row for `kind`.
pub fn capabilities(kind: MapKind) -> &'static Capabilities {
    let index = match kind {
        MapKind::Plain => 0,
        MapKind::Group => 1,
        MapKind::Account => 2,
    };
    &CAPABILITIES[index]
}

/// The row governing a CoValue. Non-map types follow the plain row.
pub fn capabilities_for(header: &CoValueHeader) -> &'static Capabilities {
    capabilities(header.map_kind().unwrap_or(MapKind::Plain))
}
