//! Protocol definitions for sync communication.
//!
//! Replicas compare [`KnownState`]s (per-session transaction counts) and send
//! each other the ranges the other side lacks as [`Content`]. Every message is
//! plain serde data so any transport can carry it.

use serde::{Deserialize, Serialize};

use crate::covalue::KnownSessions;
use crate::header::CoValueHeader;
use crate::id::{CoID, SessionID};
use crate::transaction::TransactionRecord;

/// What a replica holds of one CoValue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownState {
    pub id: CoID,
    /// Whether the header is present.
    pub header: bool,
    /// Transactions held per session.
    #[serde(default)]
    pub sessions: KnownSessions,
}

impl KnownState {
    /// State of a replica that has never seen `id`.
    pub fn unknown(id: CoID) -> Self {
        Self {
            id,
            header: false,
            sessions: KnownSessions::new(),
        }
    }

    /// Whether this state holds at least everything `other` does.
    pub fn covers(&self, other: &KnownState) -> bool {
        let held = |session: &SessionID| self.sessions.get(session).copied().unwrap_or(0);
        (self.header || !other.header)
            && other
                .sessions
                .iter()
                .all(|(session, count)| held(session) >= *count)
    }

    pub fn transaction_count(&self) -> u64 {
        self.sessions.values().sum()
    }
}

/// Missing pieces of one CoValue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: CoID,
    /// Sent when the receiver does not have the header yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<CoValueHeader>,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
}

/// One CoValue a replica offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CoID,
    /// Groups are exchanged before the values they govern.
    pub group: bool,
}

/// Request messages that can be sent to a sync peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncRequest {
    /// List the CoValues the peer holds.
    Catalog,
    /// Send what the requester lacks of one CoValue, given what it holds.
    Load { known: KnownState },
    /// Take these transactions.
    Push { content: Content },
}

/// Response messages returned from a sync peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncResponse {
    Catalog {
        entries: Vec<CatalogEntry>,
    },
    /// The responder's own state and whatever the requester was missing.
    Content {
        known: KnownState,
        content: Option<Content>,
    },
    /// Pushed content was ingested; `known` is the responder's state after it.
    Ack {
        known: KnownState,
    },
}

impl SyncResponse {
    /// Short name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncResponse::Catalog { .. } => "catalog",
            SyncResponse::Content { .. } => "content",
            SyncResponse::Ack { .. } => "ack",
        }
    }
}
