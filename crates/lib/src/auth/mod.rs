//! Write authorization and key distribution.
//!
//! Authority over a CoValue comes from its ruleset: a group's role table, a
//! single owning agent, or nobody in particular. It is always evaluated at a
//! transaction's causal key, never against "current" state, so a demotion
//! cannot retroactively invalidate earlier writes and a late-delivered demotion
//! still excludes later ones.

pub mod capabilities;
pub mod errors;
pub mod group;
pub mod keys;

pub use capabilities::{Capabilities, Role, capabilities, capabilities_for};
pub use errors::AuthError;
pub use group::GroupState;
pub use keys::KeyResolver;

use crate::header::{CoValueHeader, Ruleset};
use crate::identity::AgentID;
use crate::transaction::CausalKey;

/// The role `agent` holds over a value at `key`.
///
/// `group` must be the owning group for `OwnedByGroup` values and the value
/// itself for groups. Without it, nobody holds a role.
pub fn role_at(
    header: &CoValueHeader,
    group: Option<&GroupState>,
    agent: &AgentID,
    key: &CausalKey,
) -> Option<Role> {
    match &header.ruleset {
        Ruleset::UnsafeAllowAll => Some(Role::Writer),
        Ruleset::Account { agent: owner } => (owner == agent).then_some(Role::Admin),
        Ruleset::OwnedByGroup { .. } | Ruleset::Group { .. } => group?.role_at(agent, key),
    }
}

/// Check that `agent` may write the value at `key`.
pub fn authorize(
    header: &CoValueHeader,
    group: Option<&GroupState>,
    agent: &AgentID,
    key: &CausalKey,
) -> Result<Role, AuthError> {
    let role = role_at(header, group, agent, key);
    match role {
        Some(role) if capabilities_for(header).may_write(Some(role)) => Ok(role),
        _ => Err(AuthError::UnauthorizedWriter {
            agent: agent.clone(),
            role,
        }),
    }
}
