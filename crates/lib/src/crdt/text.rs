//! Character-level collaborative text.

use serde_json::Value;

use super::errors::CRDTError;
use super::rga::Rga;
use super::traits::Projection;
use crate::transaction::{CausalKey, ElementId, Op};

/// Plain text as a sequence of characters.
///
/// An inserted run gets one element per character, each anchored on the one
/// before it, so concurrent edits in overlapping regions never split a run
/// typed in one go.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoText {
    chars: Rga<char>,
}

impl CoText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Ids of the characters in `index..index + len`.
    pub fn ids_in(&self, index: usize, len: usize) -> Result<Vec<ElementId>, CRDTError> {
        let ids = self.chars.visible_ids();
        let end = index.saturating_add(len);
        if end > ids.len() {
            return Err(CRDTError::IndexOutOfBounds {
                index: end,
                len: ids.len(),
            });
        }
        Ok(ids[index..end].to_vec())
    }

    /// The character new text at `index` must follow.
    pub fn anchor_for(&self, index: usize) -> Result<Option<ElementId>, CRDTError> {
        if index == 0 {
            return Ok(None);
        }
        Ok(self.ids_in(index - 1, 1)?.pop())
    }
}

impl std::fmt::Display for CoText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (_, c) in self.chars.iter() {
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl Projection for CoText {
    fn apply_op(&mut self, key: &CausalKey, change: u32, op: &Op) {
        match op {
            Op::InsertText { after, text } => {
                let mut origin = after.clone();
                for (offset, c) in text.chars().enumerate() {
                    let id = ElementId::new(key, change, offset as u32);
                    self.chars.insert(id.clone(), origin, c);
                    origin = Some(id);
                }
            }
            Op::Delete { targets } => {
                for target in targets {
                    self.chars.delete(target.clone());
                }
            }
            other => tracing::trace!(op = other.name(), "Ignoring non-text operation"),
        }
    }

    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}
