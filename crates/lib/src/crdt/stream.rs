//! Append-only stream.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::traits::Projection;
use crate::id::SessionID;
use crate::transaction::{CausalKey, Op};

/// Items appended by every session. Nothing is ever merged, edited or removed;
/// the flat view is every item ordered by causal key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoStream {
    items: BTreeMap<(CausalKey, u32), Value>,
}

impl CoStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in causal order.
    pub fn items(&self) -> impl Iterator<Item = &Value> {
        self.items.values()
    }

    /// Items grouped by the session that appended them, each in append order.
    pub fn per_session(&self) -> BTreeMap<&SessionID, Vec<&Value>> {
        let mut by_session: BTreeMap<&SessionID, Vec<(&(CausalKey, u32), &Value)>> = BTreeMap::new();
        for (pos, item) in &self.items {
            by_session.entry(&pos.0.session_id).or_default().push((pos, item));
        }
        by_session
            .into_iter()
            .map(|(session, mut entries)| {
                entries.sort_by_key(|((key, change), _)| (key.tx_index, *change));
                (session, entries.into_iter().map(|(_, v)| v).collect())
            })
            .collect()
    }
}

impl Projection for CoStream {
    fn apply_op(&mut self, key: &CausalKey, change: u32, op: &Op) {
        match op {
            Op::Append { item } => {
                self.items.entry((key.clone(), change)).or_insert_with(|| item.clone());
            }
            other => tracing::trace!(op = other.name(), "Ignoring non-stream operation"),
        }
    }

    /// `{"items": [...], "sessions": {sessionID: [...]}}`.
    fn to_value(&self) -> Value {
        let sessions: Map<String, Value> = self
            .per_session()
            .into_iter()
            .map(|(session, items)| {
                (
                    session.to_string(),
                    Value::Array(items.into_iter().cloned().collect()),
                )
            })
            .collect();
        let mut out = Map::new();
        out.insert(
            "items".to_string(),
            Value::Array(self.items().cloned().collect()),
        );
        out.insert("sessions".to_string(), Value::Object(sessions));
        Value::Object(out)
    }
}
