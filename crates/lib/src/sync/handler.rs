//! Answering sync requests, and the local reads they are built from.

use tracing::{debug, warn};

use super::protocol::{CatalogEntry, Content, KnownState, SyncRequest, SyncResponse};
use crate::id::CoID;
use crate::transaction::TransactionRecord;
use crate::{Node, Result};

impl Node {
    /// What this node holds of `id`. Unknown values report an empty state.
    pub fn known_state(&self, id: &CoID) -> Result<KnownState> {
        match self.slot(id) {
            Ok(slot) => {
                let entry = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                Ok(KnownState {
                    id: id.clone(),
                    header: true,
                    sessions: entry.core.known_state(),
                })
            }
            Err(err) if err.is_not_found() => Ok(KnownState::unknown(id.clone())),
            Err(err) => Err(err),
        }
    }

    /// Everything a replica holding `known` lacks, or `None` if it lacks nothing.
    pub fn content_since(&self, known: &KnownState) -> Result<Option<Content>> {
        let slot = match self.slot(&known.id) {
            Ok(slot) => slot,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let entry = slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let header = (!known.header).then(|| entry.core.header().clone());
        let transactions: Vec<TransactionRecord> = entry
            .core
            .transactions_since(&known.sessions)
            .into_iter()
            .map(|transaction| TransactionRecord {
                co_id: known.id.clone(),
                transaction,
            })
            .collect();
        if header.is_none() && transactions.is_empty() {
            return Ok(None);
        }
        Ok(Some(Content {
            id: known.id.clone(),
            header,
            transactions,
        }))
    }

    /// Ingest content received from a peer. Returns how many transactions
    /// were appended.
    pub fn receive(&self, content: Content) -> Result<usize> {
        let Content {
            id,
            header,
            transactions,
        } = content;
        let transactions = transactions
            .into_iter()
            .filter_map(|record| {
                if record.co_id == id {
                    Some(record.transaction)
                } else {
                    warn!(co_id = %id, other = %record.co_id, "Dropping record filed under another CoValue");
                    None
                }
            })
            .collect();
        self.ingest(&id, header, transactions)
    }

    /// Answer one request from a peer.
    pub fn handle_sync_request(&self, request: SyncRequest) -> Result<SyncResponse> {
        match request {
            SyncRequest::Catalog => {
                let entries = self
                    .ids()?
                    .into_iter()
                    .map(|id| {
                        let group = self.header(&id)?.is_group();
                        Ok(CatalogEntry { id, group })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(SyncResponse::Catalog { entries })
            }
            SyncRequest::Load { known } => {
                let content = self.content_since(&known)?;
                Ok(SyncResponse::Content {
                    known: self.known_state(&known.id)?,
                    content,
                })
            }
            SyncRequest::Push { content } => {
                let id = content.id.clone();
                let appended = self.receive(content)?;
                debug!(co_id = %id, appended, "Accepted pushed content");
                Ok(SyncResponse::Ack {
                    known: self.known_state(&id)?,
                })
            }
        }
    }
}
