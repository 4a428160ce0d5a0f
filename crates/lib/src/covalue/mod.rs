//! The merge engine: verified state of a single CoValue.
//!
//! [`CoValueCore`] holds the header and one append-only log per session. It
//! verifies signatures, enforces gapless per-session indices (buffering
//! transactions that arrive ahead of their predecessor) and produces the single
//! causal order every projection replays. It does no semantic conflict
//! resolution and no authorization: both happen at materialization time so
//! they can be evaluated against each transaction's causal position.

pub mod errors;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use errors::CoreError;

use crate::constants::MAX_GAP_DISTANCE;
use crate::header::CoValueHeader;
use crate::id::{CoID, SessionID};
use crate::transaction::{CausalKey, Transaction};

/// Per-session transaction counts: what a replica has seen of a CoValue.
pub type KnownSessions = BTreeMap<SessionID, u64>;

/// What happened to an ingested transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Appended, along with `count - 1` buffered successors it unblocked.
    Appended { count: usize },
    /// Already present; nothing changed.
    Duplicate,
    /// Ahead of its predecessor; held until the gap closes.
    Buffered,
}

impl IngestOutcome {
    /// Whether the log grew.
    pub fn appended(&self) -> bool {
        matches!(self, IngestOutcome::Appended { .. })
    }
}

/// A session whose buffered transactions have waited too long for a predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapReport {
    pub session_id: SessionID,
    /// The index the session is waiting for.
    pub expected_index: u64,
    /// Indices held in the buffer.
    pub buffered: Vec<u64>,
    /// How long the oldest buffered transaction has waited.
    pub waiting_ms: u64,
}

/// Identifies one state of one in-memory core. Equal versions mean equal logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreVersion {
    /// Unique per core instance; replaced when appended transactions are undone.
    pub epoch: u64,
    pub generation: u64,
}

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

fn next_epoch() -> u64 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
struct Buffered {
    tx: Transaction,
    since: u64,
}

/// Verified state of one CoValue.
#[derive(Debug)]
pub struct CoValueCore {
    id: CoID,
    header: CoValueHeader,
    sessions: BTreeMap<SessionID, Vec<Transaction>>,
    pending: BTreeMap<SessionID, BTreeMap<u64, Buffered>>,
    epoch: u64,
    generation: u64,
}

impl Clone for CoValueCore {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            header: self.header.clone(),
            sessions: self.sessions.clone(),
            pending: self.pending.clone(),
            epoch: next_epoch(),
            generation: self.generation,
        }
    }
}

impl CoValueCore {
    /// Start an empty CoValue from a header.
    pub fn new(header: CoValueHeader) -> Result<Self, CoreError> {
        header.validate()?;
        let id = header.id()?;
        Ok(Self {
            id,
            header,
            sessions: BTreeMap::new(),
            pending: BTreeMap::new(),
            epoch: next_epoch(),
            generation: 0,
        })
    }

    /// Start from a header received under `id`, rejecting headers that do not
    /// hash to it.
    pub fn with_id(id: &CoID, header: CoValueHeader) -> Result<Self, CoreError> {
        header.verify_id(id)?;
        Self::new(header)
    }

    pub fn id(&self) -> &CoID {
        &self.id
    }

    pub fn header(&self) -> &CoValueHeader {
        &self.header
    }

    /// Bumped every time a transaction is appended.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Epoch and generation together; changes whenever the logs do.
    pub fn version(&self) -> CoreVersion {
        CoreVersion {
            epoch: self.epoch,
            generation: self.generation,
        }
    }

    /// Append-only logs, one per session.
    pub fn sessions(&self) -> &BTreeMap<SessionID, Vec<Transaction>> {
        &self.sessions
    }

    /// Index the next transaction of `session` must carry.
    pub fn next_index(&self, session: &SessionID) -> u64 {
        self.sessions.get(session).map_or(0, |log| log.len() as u64)
    }

    /// Total number of appended transactions.
    pub fn transaction_count(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }

    /// Number of transactions waiting in the gap buffer.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }

    /// Verify and add one transaction.
    ///
    /// Idempotent: re-ingesting an appended transaction reports
    /// [`IngestOutcome::Duplicate`]. A transaction whose signature does not
    /// verify, or which collides with a different transaction already in the
    /// slot, is rejected and leaves the state untouched. So is one more than
    /// [`MAX_GAP_DISTANCE`] indices ahead of its session's head.
    pub fn ingest(&mut self, tx: Transaction, now: u64) -> Result<IngestOutcome, CoreError> {
        let expected = self.next_index(&tx.session_id);

        if tx.tx_index < expected && self.is_appended(&tx) {
            return Ok(IngestOutcome::Duplicate);
        }

        if let Err(err) = tx.verify(&self.id) {
            warn!(
                co_id = %self.id,
                session = %tx.session_id,
                tx_index = tx.tx_index,
                "Rejected transaction with invalid signature"
            );
            return Err(err);
        }

        if tx.tx_index < expected {
            warn!(
                co_id = %self.id,
                session = %tx.session_id,
                tx_index = tx.tx_index,
                "Rejected conflicting transaction for an occupied slot"
            );
            return Err(CoreError::ConflictingTransaction {
                session: tx.session_id,
                tx_index: tx.tx_index,
            });
        }

        if tx.tx_index - expected > MAX_GAP_DISTANCE {
            warn!(
                co_id = %self.id,
                session = %tx.session_id,
                tx_index = tx.tx_index,
                expected,
                "Rejected transaction too far ahead of its predecessor"
            );
            return Err(CoreError::GapTooLarge {
                session: tx.session_id,
                tx_index: tx.tx_index,
                expected,
            });
        }

        if tx.tx_index > expected {
            return Ok(self.buffer(tx, expected, now));
        }

        let session = tx.session_id.clone();
        self.sessions.entry(session.clone()).or_default().push(tx);
        let count = 1 + self.drain_pending(&session);
        self.generation += 1;
        Ok(IngestOutcome::Appended { count })
    }

    fn is_appended(&self, tx: &Transaction) -> bool {
        self.sessions
            .get(&tx.session_id)
            .and_then(|log| log.get(tx.tx_index as usize))
            .is_some_and(|existing| existing.signature == tx.signature)
    }

    fn buffer(&mut self, tx: Transaction, expected: u64, now: u64) -> IngestOutcome {
        debug!(
            co_id = %self.id,
            session = %tx.session_id,
            tx_index = tx.tx_index,
            expected,
            "Buffering transaction ahead of its predecessor"
        );
        let slots = self.pending.entry(tx.session_id.clone()).or_default();
        match slots.get_mut(&tx.tx_index) {
            Some(held) if held.tx.signature == tx.signature => IngestOutcome::Duplicate,
            Some(held) => {
                // Two candidates for one slot: keep the smaller signature so the
                // choice does not depend on arrival order.
                if tx.signature < held.tx.signature {
                    held.tx = tx;
                }
                IngestOutcome::Buffered
            }
            None => {
                slots.insert(tx.tx_index, Buffered { tx, since: now });
                IngestOutcome::Buffered
            }
        }
    }

    fn drain_pending(&mut self, session: &SessionID) -> usize {
        let Some(slots) = self.pending.get_mut(session) else {
            return 0;
        };
        let Some(log) = self.sessions.get_mut(session) else {
            return 0;
        };
        let mut drained = 0;
        while let Some(held) = slots.remove(&(log.len() as u64)) {
            log.push(held.tx);
            drained += 1;
        }
        // Anything left below the new head lost its slot race.
        slots.retain(|index, _| *index >= log.len() as u64);
        if slots.is_empty() {
            self.pending.remove(session);
        }
        if drained > 0 {
            debug!(co_id = %self.id, session = %session, drained, "Gap closed");
        }
        drained
    }

    /// Undo appends beyond `keep`, dropping them rather than re-buffering.
    ///
    /// Starts a new epoch so that anything cached against the old logs is
    /// rebuilt. Returns how many transactions were removed.
    pub fn truncate_to(&mut self, keep: &KnownSessions) -> usize {
        let mut removed = 0;
        self.sessions.retain(|session, log| {
            let held = keep.get(session).copied().unwrap_or(0) as usize;
            if log.len() > held {
                removed += log.len() - held;
                log.truncate(held);
            }
            !log.is_empty()
        });
        if removed > 0 {
            warn!(co_id = %self.id, removed, "Appended transactions undone");
            self.epoch = next_epoch();
            self.generation += 1;
        }
        removed
    }

    /// Every appended transaction in causal order.
    pub fn ordered_transactions(&self) -> Vec<&Transaction> {
        let mut all: Vec<&Transaction> = self.sessions.values().flatten().collect();
        all.sort_by_cached_key(|tx| tx.causal_key());
        all
    }

    /// The causal key of the newest appended transaction, if any.
    pub fn latest_key(&self) -> Option<CausalKey> {
        self.sessions
            .values()
            .filter_map(|log| log.last())
            .map(Transaction::causal_key)
            .max()
    }

    /// Per-session counts of appended transactions.
    pub fn known_state(&self) -> KnownSessions {
        self.sessions
            .iter()
            .map(|(session, log)| (session.clone(), log.len() as u64))
            .collect()
    }

    /// Appended transactions a replica with `known` has not seen.
    pub fn transactions_since(&self, known: &KnownSessions) -> Vec<Transaction> {
        self.sessions
            .iter()
            .flat_map(|(session, log)| {
                let seen = known.get(session).copied().unwrap_or(0) as usize;
                log.iter().skip(seen).cloned()
            })
            .collect()
    }

    /// Sessions whose oldest buffered transaction has waited at least `window_ms`.
    pub fn unresolved_gaps(&self, now: u64, window_ms: u64) -> Vec<GapReport> {
        self.pending
            .iter()
            .filter_map(|(session, slots)| {
                let oldest = slots.values().map(|held| held.since).min()?;
                let waiting_ms = now.saturating_sub(oldest);
                (waiting_ms >= window_ms).then(|| GapReport {
                    session_id: session.clone(),
                    expected_index: self.next_index(session),
                    buffered: slots.keys().copied().collect(),
                    waiting_ms,
                })
            })
            .collect()
    }
}
