//! Last-writer-wins map.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::traits::Projection;
use crate::transaction::{CausalKey, Op};

/// Position of a write: the transaction's causal key plus the operation index,
/// so two writes to one key inside a single transaction are ordered too.
type Stamp = (CausalKey, u32);

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    stamp: Stamp,
    /// `None` is a tombstone.
    value: Option<Value>,
}

/// A map where each key holds the write with the greatest causal key.
///
/// Deletes are tombstones that compete in the same order, so a delete older
/// than a concurrent set loses to it and vice versa.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoMap {
    entries: BTreeMap<String, Entry>,
}

impl CoMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `key`, if set and not deleted.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key).and_then(|e| e.value.as_ref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Live keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(k, _)| k)
    }

    /// Live entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.value.as_ref().map(|v| (k.as_str(), v)))
    }

    /// Live entries whose key starts with `prefix`.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a Value)> {
        self.iter().filter(move |(k, _)| k.starts_with(prefix))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` has ever been written, including deleted keys.
    pub fn was_written(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn write(&mut self, key: &str, stamp: Stamp, value: Option<Value>) {
        match self.entries.get_mut(key) {
            Some(existing) if existing.stamp >= stamp => {}
            Some(existing) => *existing = Entry { stamp, value },
            None => {
                self.entries.insert(key.to_string(), Entry { stamp, value });
            }
        }
    }
}

impl Projection for CoMap {
    fn apply_op(&mut self, key: &CausalKey, change: u32, op: &Op) {
        match op {
            Op::Set { key: k, value } => self.write(k, (key.clone(), change), Some(value.clone())),
            Op::Del { key: k } => self.write(k, (key.clone(), change), None),
            other => tracing::trace!(op = other.name(), "Ignoring non-map operation"),
        }
    }

    fn to_value(&self) -> Value {
        let map: Map<String, Value> = self.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        Value::Object(map)
    }
}
