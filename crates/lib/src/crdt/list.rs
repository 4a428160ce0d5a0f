//! Ordered list of JSON values.

use serde_json::Value;

use super::errors::CRDTError;
use super::rga::Rga;
use super::traits::Projection;
use crate::transaction::{CausalKey, ElementId, Op};

/// An ordered list with stable element identities.
///
/// Concurrent inserts at the same position interleave by element id, removal
/// leaves a tombstone, and a move is a removal plus an insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoList {
    items: Rga<Value>,
}

impl CoList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Visible item at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.iter().nth(index).map(|(_, v)| v)
    }

    /// Visible items in order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.items.iter().map(|(_, v)| v)
    }

    /// Stable id of the visible item at `index`.
    pub fn id_at(&self, index: usize) -> Result<ElementId, CRDTError> {
        let ids = self.items.visible_ids();
        ids.get(index).cloned().ok_or(CRDTError::IndexOutOfBounds {
            index,
            len: ids.len(),
        })
    }

    /// The element a new item at `index` must be inserted after. `index` may
    /// equal the length (append).
    pub fn anchor_for(&self, index: usize) -> Result<Option<ElementId>, CRDTError> {
        let ids = self.items.visible_ids();
        if index > ids.len() {
            return Err(CRDTError::IndexOutOfBounds {
                index,
                len: ids.len(),
            });
        }
        Ok(index.checked_sub(1).map(|prev| ids[prev].clone()))
    }

    /// Whether an element was ever inserted, deleted or not.
    pub fn contains(&self, id: &ElementId) -> bool {
        self.items.contains(id)
    }
}

impl Projection for CoList {
    fn apply_op(&mut self, key: &CausalKey, change: u32, op: &Op) {
        match op {
            Op::Insert { after, value } => {
                self.items
                    .insert(ElementId::new(key, change, 0), after.clone(), value.clone());
            }
            Op::Delete { targets } => {
                for target in targets {
                    self.items.delete(target.clone());
                }
            }
            other => tracing::trace!(op = other.name(), "Ignoring non-list operation"),
        }
    }

    fn to_value(&self) -> Value {
        Value::Array(self.iter().cloned().collect())
    }
}
