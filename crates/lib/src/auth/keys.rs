//! Read key resolution.
//!
//! A key is found, in order: among keys this node already holds, from the
//! host's [`KeyProvider`], sealed to this agent inside the group, or through a
//! newer key the group has published it under.

use std::collections::HashMap;

use tracing::debug;

use super::group::GroupState;
use crate::crypto::{KeyID, KeySecret, unseal};
use crate::identity::{AgentID, KeyProvider};

/// Longest chain of `key:<old>:for:<new>` links followed.
const MAX_KEY_CHAIN: usize = 32;

/// Finds read keys for one reader and, optionally, one group.
pub struct KeyResolver<'a> {
    provider: &'a dyn KeyProvider,
    agent_id: AgentID,
    known: &'a HashMap<KeyID, KeySecret>,
    group: Option<&'a GroupState>,
}

impl<'a> KeyResolver<'a> {
    pub fn new(
        provider: &'a dyn KeyProvider,
        known: &'a HashMap<KeyID, KeySecret>,
        group: Option<&'a GroupState>,
    ) -> Self {
        Self {
            agent_id: provider.agent_secret().agent_id(),
            provider,
            known,
            group,
        }
    }

    /// The secret for `key_id`, if this reader can obtain it.
    pub fn resolve(&self, key_id: &KeyID) -> Option<KeySecret> {
        self.resolve_within(key_id, MAX_KEY_CHAIN)
    }

    fn resolve_within(&self, key_id: &KeyID, depth: usize) -> Option<KeySecret> {
        if let Some(secret) = self.known.get(key_id) {
            return Some(secret.clone());
        }
        if let Some(secret) = self.provider.read_key(key_id) {
            return Some(secret);
        }
        let group = self.group?;

        if let Some(sealed) = group.sealed_key_for(key_id, &self.agent_id) {
            let secret = unseal(&sealed, &self.provider.agent_secret().sealer)
                .and_then(|bytes| KeySecret::from_bytes(&bytes));
            match secret {
                Ok(secret) => return Some(secret),
                Err(err) => debug!(key_id = %key_id, error = %err, "Sealed read key did not open"),
            }
        }

        if depth == 0 {
            return None;
        }
        group
            .revelations_of(key_id)
            .into_iter()
            .find_map(|(newer, encrypted)| {
                let newer_secret = self.resolve_within(&newer, depth - 1)?;
                let bytes = newer_secret.decrypt(&encrypted).ok()?;
                KeySecret::from_bytes(&bytes).ok()
            })
    }
}
