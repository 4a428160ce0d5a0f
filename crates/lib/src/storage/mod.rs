//! Durable state behind the registry.
//!
//! Storage holds exactly what a replica verified: headers and the appended
//! transactions of each session. Materialized values are never stored; they
//! are rebuilt from this state when a CoValue is loaded.

pub mod errors;
pub mod in_memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use errors::StorageError;
pub use in_memory::InMemory;

use crate::header::CoValueHeader;
use crate::id::{CoID, SessionID};
use crate::transaction::Transaction;

/// Everything stored for one CoValue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCoValue {
    pub header: CoValueHeader,
    #[serde(default)]
    pub sessions: BTreeMap<SessionID, Vec<Transaction>>,
}

impl StoredCoValue {
    pub fn new(header: CoValueHeader) -> Self {
        Self {
            header,
            sessions: BTreeMap::new(),
        }
    }

    /// Stored transactions across all sessions.
    pub fn transaction_count(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }
}

/// Persistence for verified CoValue state.
///
/// Writes are idempotent: storing a header or transaction that is already
/// present changes nothing.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Store the header of a CoValue.
    fn put_header(&self, id: &CoID, header: &CoValueHeader) -> Result<(), StorageError>;

    /// Store one appended transaction. The header must already be stored.
    fn append(&self, id: &CoID, tx: &Transaction) -> Result<(), StorageError>;

    /// Everything stored for `id`, or `None` when the CoValue is unknown.
    fn load(&self, id: &CoID) -> Result<Option<StoredCoValue>, StorageError>;

    /// Ids of all stored CoValues.
    fn ids(&self) -> Result<Vec<CoID>, StorageError>;
}
