//! Type projections: the conflict resolution algorithms.
//!
//! Each CoValue type has one projection that replays operations into a value:
//!
//! - [`CoMap`]: last-writer-wins per key, by causal key.
//! - [`CoList`]: replicated growable array with tombstones.
//! - [`CoStream`]: append-only, per-session logs plus a causal flat view.
//! - [`CoText`]: the list algorithm applied to characters.
//!
//! All of them implement [`Projection`] and are order-independent.

pub mod edit;
pub mod errors;
pub mod list;
pub mod map;
pub mod rga;
pub mod stream;
pub mod text;
pub mod traits;

use serde_json::Value;

pub use edit::{Edit, ListEdit, MapEdit, StreamEdit, TextEdit, initial_edits, plan};
pub use errors::CRDTError;
pub use list::CoList;
pub use map::CoMap;
pub use stream::CoStream;
pub use text::CoText;
pub use traits::Projection;

use crate::header::CoValueType;
use crate::transaction::{CausalKey, Op};

/// The projection matching a CoValue's type.
#[derive(Debug, Clone, PartialEq)]
pub enum Projector {
    Map(CoMap),
    List(CoList),
    Stream(CoStream),
    Text(CoText),
}

impl Projector {
    /// An empty projection for `co_type`.
    pub fn new(co_type: CoValueType) -> Self {
        match co_type {
            CoValueType::Map => Projector::Map(CoMap::new()),
            CoValueType::List => Projector::List(CoList::new()),
            CoValueType::Stream => Projector::Stream(CoStream::new()),
            CoValueType::Text => Projector::Text(CoText::new()),
        }
    }

    pub fn co_type(&self) -> CoValueType {
        match self {
            Projector::Map(_) => CoValueType::Map,
            Projector::List(_) => CoValueType::List,
            Projector::Stream(_) => CoValueType::Stream,
            Projector::Text(_) => CoValueType::Text,
        }
    }

    pub fn as_map(&self) -> Option<&CoMap> {
        match self {
            Projector::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl Projection for Projector {
    fn apply_op(&mut self, key: &CausalKey, change: u32, op: &Op) {
        match self {
            Projector::Map(p) => p.apply_op(key, change, op),
            Projector::List(p) => p.apply_op(key, change, op),
            Projector::Stream(p) => p.apply_op(key, change, op),
            Projector::Text(p) => p.apply_op(key, change, op),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Projector::Map(p) => p.to_value(),
            Projector::List(p) => p.to_value(),
            Projector::Stream(p) => p.to_value(),
            Projector::Text(p) => p.to_value(),
        }
    }
}
