//!
//! Covalent: conflict-free replicated values that every replica merges to the same state.
//!
//! ## Core Concepts
//!
//! * **CoValues (`covalue::CoValueCore`)**: a map, list, stream or text value
//!   addressed by the hash of its immutable header (`id::CoID`). Each writer
//!   appends signed transactions to its own session log.
//! * **Causal order (`transaction::CausalKey`)**: `(madeAt, sessionID, txIndex)`
//!   totally orders every transaction on every replica, independent of arrival.
//! * **Projections (`crdt`)**: last-writer-wins maps, replicated growable
//!   arrays for lists and text, and append-only streams. Each one yields the
//!   same value for the same transaction set in any order.
//! * **Groups (`auth`)**: maps of member roles and read keys. A transaction
//!   counts only if its writer held a writing role at its causal position.
//! * **Nodes (`node::Node`)**: a replica acting as one agent, with a registry
//!   of loaded values, storage, subscriptions and sync.

pub mod auth;
pub mod clock;
pub mod constants;
pub mod covalue;
pub mod crdt;
pub mod crypto;
pub mod header;
pub mod id;
pub mod identity;
pub mod materialize;
pub mod node;
pub mod storage;
pub mod sync;
pub mod transaction;

pub use auth::{GroupState, Role};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use clock::{Clock, SystemClock};
pub use covalue::{CoValueCore, CoreVersion, GapReport, IngestOutcome};
pub use crdt::Edit;
pub use header::{CoValueHeader, CoValueType, Ruleset};
pub use id::{CoID, SessionID, TransactionID};
pub use identity::{AgentID, AgentSecret, KeyProvider, LocalKeyring};
pub use materialize::{MaterializationStrategy, Materialized};
pub use node::{Node, NodeConfig, Subscription, WeakNode};
pub use sync::{LocalTransport, SyncReport, SyncTransport};
pub use transaction::{Transaction, TransactionRecord};

/// Result type used throughout the Covalent library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Covalent library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured errors from the crypto module
    #[error(transparent)]
    Crypto(crypto::CryptoError),

    /// Structured merge engine errors from the covalue module
    #[error(transparent)]
    Core(covalue::CoreError),

    /// Structured authorization errors from the auth module
    #[error(transparent)]
    Auth(auth::AuthError),

    /// Structured CRDT errors from the crdt module
    #[error(transparent)]
    CRDT(crdt::CRDTError),

    /// Structured node errors from the node module
    #[error(transparent)]
    Node(node::NodeError),

    /// Structured storage errors from the storage module
    #[error(transparent)]
    Storage(storage::StorageError),

    /// Structured sync errors from the sync module
    #[error(transparent)]
    Sync(sync::SyncError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Crypto(_) => "crypto",
            Error::Core(_) => "covalue",
            Error::Auth(_) => "auth",
            Error::CRDT(_) => "crdt",
            Error::Node(_) => "node",
            Error::Storage(_) => "storage",
            Error::Sync(_) => "sync",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Node(node_err) => node_err.is_not_found(),
            Error::Auth(auth_err) => auth_err.is_not_found(),
            Error::Storage(storage_err) => storage_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates permission was denied.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::Auth(auth_err) => auth_err.is_permission_denied(),
            _ => false,
        }
    }

    /// Check if this error is a signature failure.
    pub fn is_signature_error(&self) -> bool {
        match self {
            Error::Crypto(crypto_err) => crypto_err.is_invalid_signature(),
            Error::Core(core_err) => core_err.is_signature_invalid(),
            _ => false,
        }
    }

    /// Check if this error makes a CoValue unusable (corrupt header, id collision).
    pub fn is_structural(&self) -> bool {
        match self {
            Error::Core(core_err) => core_err.is_structural(),
            Error::Storage(storage_err) => storage_err.is_collision(),
            _ => false,
        }
    }

    /// Check if this error is about missing read keys.
    pub fn is_key_unavailable(&self) -> bool {
        match self {
            Error::Auth(auth_err) => auth_err.is_key_unavailable(),
            Error::Crypto(crypto_err) => crypto_err.is_decryption_error(),
            _ => false,
        }
    }

    /// Check if this error is a connectivity problem with a sync peer.
    pub fn is_network_error(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_network_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Storage(storage_err) => storage_err.is_io_error(),
            _ => false,
        }
    }

    /// Check if this error is a CRDT type mismatch.
    pub fn is_crdt_type_error(&self) -> bool {
        match self {
            Error::CRDT(crdt_err) => crdt_err.is_type_error(),
            _ => false,
        }
    }
}
