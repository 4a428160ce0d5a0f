//! Materialized group state: the role timeline and key distribution fields.
//!
//! A group is a map whose keys are member agent ids (holding roles), `readKey`
//! (the current read key id), `key:<keyID>:<agentID>` (that key sealed to a
//! member) and `key:<old>:for:<new>` (an old key encrypted under a newer one).
//!
//! Group transactions are authorized against the group itself: each one is
//! checked against the roles in force just before its causal key, so a role
//! change only affects transactions after it.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::warn;

use super::capabilities::{Role, capabilities};
use super::errors::AuthError;
use crate::constants::{KEY_FIELD_PREFIX, READ_KEY_FIELD};
use crate::covalue::{CoValueCore, CoreVersion};
use crate::crdt::{CoMap, Projection};
use crate::crypto::{KeyID, Sealed};
use crate::header::{MapKind, Ruleset};
use crate::id::CoID;
use crate::identity::AgentID;
use crate::transaction::{CausalKey, Changes, Op};

/// Field holding `key_id` sealed to `agent`.
pub fn sealed_key_field(key_id: &KeyID, agent: &AgentID) -> String {
    format!("{KEY_FIELD_PREFIX}{key_id}:{agent}")
}

/// Field holding `old` encrypted under `new`.
pub fn revelation_field(old: &KeyID, new: &KeyID) -> String {
    format!("{KEY_FIELD_PREFIX}{old}:for:{new}")
}

fn revelation_prefix(old: &KeyID) -> String {
    format!("{KEY_FIELD_PREFIX}{old}:for:")
}

/// A group as of all transactions known locally.
#[derive(Debug, Clone)]
pub struct GroupState {
    id: CoID,
    initial_admin: AgentID,
    timeline: BTreeMap<AgentID, Vec<(CausalKey, Role)>>,
    fields: CoMap,
    rejected: usize,
    version: CoreVersion,
    latest: Option<CausalKey>,
}

impl GroupState {
    /// Replay a group's transactions in causal order.
    pub fn build(core: &CoValueCore) -> Result<Self, AuthError> {
        let Ruleset::Group { initial_admin } = &core.header().ruleset else {
            return Err(AuthError::NotAGroup {
                id: core.id().clone(),
            });
        };
        let caps = capabilities(MapKind::Group);
        let mut state = GroupState {
            id: core.id().clone(),
            initial_admin: initial_admin.clone(),
            timeline: BTreeMap::new(),
            fields: CoMap::new(),
            rejected: 0,
            version: core.version(),
            latest: core.latest_key(),
        };

        for tx in core.ordered_transactions() {
            let key = tx.causal_key();
            let agent = tx.session_id.agent();
            let role = state.role_at(&agent, &key);
            if !caps.may_write(role) {
                warn!(
                    group = %state.id,
                    agent = %agent,
                    tx_index = tx.tx_index,
                    role = ?role,
                    "Unauthorized writer: group change excluded"
                );
                state.rejected += 1;
                continue;
            }
            let Changes::Trusting { changes } = &tx.changes else {
                warn!(group = %state.id, tx_index = tx.tx_index, "Private group change excluded");
                state.rejected += 1;
                continue;
            };
            for (change, op) in changes.iter().enumerate() {
                if !caps.accepts(op) || !state.record_role(&key, op) {
                    continue;
                }
                state.fields.apply_op(&key, change as u32, op);
            }
        }
        Ok(state)
    }

    /// Track role assignments. Returns false for malformed role writes.
    fn record_role(&mut self, key: &CausalKey, op: &Op) -> bool {
        let (field, role) = match op {
            Op::Set { key: field, value } => (field, Role::from_value(value)),
            Op::Del { key: field } => (field, Some(Role::Revoked)),
            _ => return true,
        };
        let Ok(member) = AgentID::parse(field) else {
            return true;
        };
        match role {
            Some(role) => {
                self.timeline.entry(member).or_default().push((key.clone(), role));
                true
            }
            None => false,
        }
    }

    pub fn id(&self) -> &CoID {
        &self.id
    }

    /// Version of the group core this state was built from.
    pub fn version(&self) -> CoreVersion {
        self.version
    }

    /// Causal key of the newest group transaction, authorized or not.
    pub fn latest_key(&self) -> Option<&CausalKey> {
        self.latest.as_ref()
    }

    /// Group transactions excluded for lack of authority.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Role of `agent` just before `key`.
    pub fn role_at(&self, agent: &AgentID, key: &CausalKey) -> Option<Role> {
        self.timeline
            .get(agent)
            .and_then(|entries| entries.iter().rev().find(|(at, _)| at < key))
            .map(|(_, role)| *role)
            .or_else(|| (agent == &self.initial_admin).then_some(Role::Admin))
    }

    /// Role of `agent` after every known transaction.
    pub fn role(&self, agent: &AgentID) -> Option<Role> {
        self.timeline
            .get(agent)
            .and_then(|entries| entries.last())
            .map(|(_, role)| *role)
            .or_else(|| (agent == &self.initial_admin).then_some(Role::Admin))
    }

    /// Every agent that has ever held a role, with its current role.
    pub fn members(&self) -> BTreeMap<AgentID, Role> {
        let mut members: BTreeMap<AgentID, Role> = self
            .timeline
            .iter()
            .filter_map(|(agent, entries)| entries.last().map(|(_, role)| (agent.clone(), *role)))
            .collect();
        members.entry(self.initial_admin.clone()).or_insert(Role::Admin);
        members
    }

    /// The key new content must be encrypted with.
    pub fn read_key_id(&self) -> Option<KeyID> {
        self.fields
            .get(READ_KEY_FIELD)
            .and_then(Value::as_str)
            .map(KeyID::new)
    }

    /// `key_id` sealed to `agent`, if the group carries it.
    pub fn sealed_key_for(&self, key_id: &KeyID, agent: &AgentID) -> Option<Sealed> {
        let value = self.fields.get(&sealed_key_field(key_id, agent))?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Newer keys under which `old` has been published, with the ciphertext.
    pub fn revelations_of(&self, old: &KeyID) -> Vec<(KeyID, String)> {
        let prefix = revelation_prefix(old);
        self.fields
            .with_prefix(&prefix)
            .filter_map(|(field, value)| {
                let newer = field.strip_prefix(prefix.as_str())?;
                Some((KeyID::new(newer), value.as_str()?.to_string()))
            })
            .collect()
    }

    /// The group's fields as JSON.
    pub fn to_value(&self) -> Value {
        self.fields.to_value()
    }
}
