//! Wire-level operations carried inside a transaction.
//!
//! Operations never reference positions by index: list and text operations
//! name the element they attach to, so they mean the same thing on every
//! replica regardless of what that replica has seen.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CausalKey;
use crate::id::SessionID;

/// Stable identity of one list element or text character.
///
/// Derived from the inserting transaction's causal key, the index of the
/// operation inside that transaction and, for text runs, the character offset.
/// Ordering follows the causal key, so "newer" is well-defined everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementId {
    pub made_at: u64,
    pub session_id: SessionID,
    pub tx_index: u64,
    pub change: u32,
    pub offset: u32,
}

impl ElementId {
    /// Id of the `offset`th element inserted by operation `change` of the
    /// transaction at `key`.
    pub fn new(key: &CausalKey, change: u32, offset: u32) -> Self {
        Self {
            made_at: key.made_at,
            session_id: key.session_id.clone(),
            tx_index: key.tx_index,
            change,
            offset,
        }
    }
}

/// One operation. Which variants are meaningful depends on the CoValue type;
/// projections ignore the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Op {
    /// Map: write a key.
    Set { key: String, value: Value },
    /// Map: delete a key. Leaves a tombstone that still takes part in LWW.
    Del { key: String },
    /// List: insert one element right after `after` (`None` = at the head).
    Insert { after: Option<ElementId>, value: Value },
    /// Text: insert a run of characters right after `after`.
    InsertText { after: Option<ElementId>, text: String },
    /// List and text: tombstone elements.
    Delete { targets: Vec<ElementId> },
    /// Stream: append one item.
    Append { item: Value },
}

impl Op {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Set { .. } => "set",
            Op::Del { .. } => "del",
            Op::Insert { .. } => "insert",
            Op::InsertText { .. } => "insertText",
            Op::Delete { .. } => "delete",
            Op::Append { .. } => "append",
        }
    }
}
