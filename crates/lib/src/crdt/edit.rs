//! Caller-facing edits and their translation into wire operations.
//!
//! Callers think in indices ("insert at 3"); replicas need stable element ids.
//! [`plan`] resolves indices against the writer's current view, applying each
//! edit to a scratch copy so later edits in the same batch see earlier ones.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::CRDTError;
use super::traits::Projection;
use super::Projector;
use crate::header::CoValueType;
use crate::transaction::{CausalKey, ElementId, Op};

/// Map edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum MapEdit {
    Set { key: String, value: Value },
    Delete { key: String },
}

/// List edits. Indices refer to the visible list at the time of the edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ListEdit {
    Insert { index: usize, value: Value },
    Push { value: Value },
    Replace { index: usize, value: Value },
    Remove { index: usize },
    /// Move the item at `from` so it ends up at index `to`.
    Move { from: usize, to: usize },
}

/// Stream edits. Streams only grow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum StreamEdit {
    Append { item: Value },
}

/// Text edits, in characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum TextEdit {
    Insert { index: usize, text: String },
    Delete { index: usize, len: usize },
}

/// One edit to a CoValue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "edit", rename_all = "camelCase")]
pub enum Edit {
    Map(MapEdit),
    List(ListEdit),
    Stream(StreamEdit),
    Text(TextEdit),
}

impl Edit {
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Edit::Map(MapEdit::Set {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Edit::Map(MapEdit::Delete { key: key.into() })
    }

    pub fn insert(index: usize, value: impl Into<Value>) -> Self {
        Edit::List(ListEdit::Insert {
            index,
            value: value.into(),
        })
    }

    pub fn push(value: impl Into<Value>) -> Self {
        Edit::List(ListEdit::Push {
            value: value.into(),
        })
    }

    pub fn replace(index: usize, value: impl Into<Value>) -> Self {
        Edit::List(ListEdit::Replace {
            index,
            value: value.into(),
        })
    }

    pub fn remove(index: usize) -> Self {
        Edit::List(ListEdit::Remove { index })
    }

    pub fn move_item(from: usize, to: usize) -> Self {
        Edit::List(ListEdit::Move { from, to })
    }

    pub fn append(item: impl Into<Value>) -> Self {
        Edit::Stream(StreamEdit::Append { item: item.into() })
    }

    pub fn insert_text(index: usize, text: impl Into<String>) -> Self {
        Edit::Text(TextEdit::Insert {
            index,
            text: text.into(),
        })
    }

    pub fn delete_text(index: usize, len: usize) -> Self {
        Edit::Text(TextEdit::Delete { index, len })
    }

    fn name(&self) -> &'static str {
        match self {
            Edit::Map(_) => "map",
            Edit::List(_) => "list",
            Edit::Stream(_) => "stream",
            Edit::Text(_) => "text",
        }
    }
}

/// Edits that build `initial` from an empty value of `co_type`.
pub fn initial_edits(co_type: CoValueType, initial: &Value) -> Result<Vec<Edit>, CRDTError> {
    let mismatch = |expected: &str| CRDTError::InvalidValue {
        reason: format!("initial value of a {co_type} must be {expected}"),
    };
    match (co_type, initial) {
        (_, Value::Null) => Ok(Vec::new()),
        (CoValueType::Map, Value::Object(fields)) => Ok(fields
            .iter()
            .map(|(k, v)| Edit::set(k.clone(), v.clone()))
            .collect()),
        (CoValueType::List, Value::Array(items)) => {
            Ok(items.iter().cloned().map(Edit::push).collect())
        }
        (CoValueType::Stream, Value::Array(items)) => {
            Ok(items.iter().cloned().map(Edit::append).collect())
        }
        (CoValueType::Text, Value::String(s)) if s.is_empty() => Ok(Vec::new()),
        (CoValueType::Text, Value::String(s)) => Ok(vec![Edit::insert_text(0, s.clone())]),
        (CoValueType::Map, _) => Err(mismatch("an object")),
        (CoValueType::List | CoValueType::Stream, _) => Err(mismatch("an array")),
        (CoValueType::Text, _) => Err(mismatch("a string")),
    }
}

/// Translate `edits` into operations for a transaction at `key`, resolving
/// indices against `view`.
pub fn plan(view: &Projector, edits: &[Edit], key: &CausalKey) -> Result<Vec<Op>, CRDTError> {
    let mut scratch = view.clone();
    let mut ops = Vec::new();
    for edit in edits {
        for op in plan_one(&scratch, edit, key, ops.len() as u32)? {
            scratch.apply_op(key, ops.len() as u32, &op);
            ops.push(op);
        }
    }
    Ok(ops)
}

fn plan_one(view: &Projector, edit: &Edit, key: &CausalKey, next_change: u32) -> Result<Vec<Op>, CRDTError> {
    let mismatch = || CRDTError::TypeMismatch {
        edit: edit.name(),
        actual: view.co_type(),
    };
    match (view, edit) {
        (Projector::Map(_), Edit::Map(MapEdit::Set { key, value })) => Ok(vec![Op::Set {
            key: key.clone(),
            value: value.clone(),
        }]),
        (Projector::Map(_), Edit::Map(MapEdit::Delete { key })) => {
            Ok(vec![Op::Del { key: key.clone() }])
        }
        (Projector::List(list), Edit::List(edit)) => match edit {
            ListEdit::Insert { index, value } => Ok(vec![Op::Insert {
                after: list.anchor_for(*index)?,
                value: value.clone(),
            }]),
            ListEdit::Push { value } => Ok(vec![Op::Insert {
                after: list.anchor_for(list.len())?,
                value: value.clone(),
            }]),
            ListEdit::Replace { index, value } => {
                let target = list.id_at(*index)?;
                Ok(vec![
                    Op::Delete {
                        targets: vec![target.clone()],
                    },
                    Op::Insert {
                        after: Some(target),
                        value: value.clone(),
                    },
                ])
            }
            ListEdit::Remove { index } => Ok(vec![Op::Delete {
                targets: vec![list.id_at(*index)?],
            }]),
            ListEdit::Move { from, to } => {
                let target = list.id_at(*from)?;
                let value = list.get(*from).cloned().unwrap_or(Value::Null);
                let delete = Op::Delete {
                    targets: vec![target],
                };
                let mut after_delete = list.clone();
                after_delete.apply_op(key, next_change, &delete);
                let insert = Op::Insert {
                    after: after_delete.anchor_for(*to)?,
                    value,
                };
                Ok(vec![delete, insert])
            }
        },
        (Projector::Stream(_), Edit::Stream(StreamEdit::Append { item })) => {
            Ok(vec![Op::Append { item: item.clone() }])
        }
        (Projector::Text(text), Edit::Text(TextEdit::Insert { index, text: s })) => {
            Ok(vec![Op::InsertText {
                after: text.anchor_for(*index)?,
                text: s.clone(),
            }])
        }
        (Projector::Text(text), Edit::Text(TextEdit::Delete { index, len })) => {
            let targets: Vec<ElementId> = text.ids_in(*index, *len)?;
            if targets.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![Op::Delete { targets }])
        }
        _ => Err(mismatch()),
    }
}
