//! Running a sync exchange against one peer.
//!
//! Values are exchanged one at a time, groups first so a receiver can check
//! authority as soon as the values they govern arrive. Each value is a pull
//! (send our [`KnownState`], ingest what comes back) followed by a push of
//! whatever the peer still lacks. The peer's answer to the pull is taken as
//! its current state: an exchange abandoned halfway resumes without resending
//! what already arrived, and a peer that lost data since its last
//! acknowledgement gets it again. Acknowledgements are kept per peer as a
//! record of progress.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::SyncError;
use super::protocol::{CatalogEntry, KnownState, SyncRequest, SyncResponse};
use super::transport::SyncTransport;
use crate::id::CoID;
use crate::{Node, Result};

/// Sync progress with one peer.
#[derive(Debug, Clone, Default)]
pub struct PeerState {
    acknowledged: HashMap<CoID, KnownState>,
    last_sync: Option<u64>,
}

impl PeerState {
    /// The peer's state for `id` as of its last acknowledgement.
    pub fn acknowledged(&self, id: &CoID) -> Option<&KnownState> {
        self.acknowledged.get(id)
    }

    /// When the last complete exchange finished, in clock milliseconds.
    pub fn last_sync(&self) -> Option<u64> {
        self.last_sync
    }

    /// Replace what is known of the peer's state for one value.
    fn record(&mut self, known: KnownState) {
        self.acknowledged.insert(known.id.clone(), known);
    }
}

/// Outcome of one [`Node::sync`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// CoValues exchanged.
    pub values: usize,
    /// Transactions appended locally.
    pub received: usize,
    /// Transactions pushed to the peer.
    pub sent: usize,
}

fn unexpected(expected: &'static str, actual: &SyncResponse) -> SyncError {
    SyncError::UnexpectedResponse {
        expected,
        actual: actual.kind().to_string(),
    }
}

impl Node {
    /// Bidirectionally exchange every CoValue either side holds with the peer
    /// behind `transport`.
    ///
    /// Safe to abandon at any point and to repeat: ingestion is idempotent.
    /// An unreachable peer is retried with capped exponential backoff and
    /// then reported as [`SyncError::PeerUnreachable`].
    pub async fn sync(&self, transport: &dyn SyncTransport) -> Result<SyncReport> {
        let peer = transport.peer_id().to_string();
        let entries = match self.request(transport, &SyncRequest::Catalog).await? {
            SyncResponse::Catalog { entries } => entries,
            other => return Err(unexpected("catalog", &other).into()),
        };

        let mut report = SyncReport::default();
        for id in self.exchange_order(entries)? {
            self.sync_value(transport, &peer, &id, &mut report).await?;
        }

        let now = self.now();
        self.with_peer(&peer, |state| state.last_sync = Some(now));
        info!(
            peer = %peer,
            values = report.values,
            received = report.received,
            sent = report.sent,
            at = %self.now_rfc3339(),
            "Sync complete"
        );
        Ok(report)
    }

    /// Progress recorded for `peer`, if any exchange has happened.
    pub fn peer_state(&self, peer: &str) -> Option<PeerState> {
        self.peers().get(peer).cloned()
    }

    fn with_peer<R>(&self, peer: &str, f: impl FnOnce(&mut PeerState) -> R) -> R {
        f(self.peers().entry(peer.to_string()).or_default())
    }

    /// Local and remote ids, groups first.
    fn exchange_order(&self, remote: Vec<CatalogEntry>) -> Result<Vec<CoID>> {
        let mut all: BTreeMap<CoID, bool> = remote
            .into_iter()
            .map(|entry| (entry.id, entry.group))
            .collect();
        for id in self.ids()? {
            let group = self.header(&id)?.is_group();
            all.insert(id, group);
        }
        let (groups, values): (Vec<_>, Vec<_>) = all.into_iter().partition(|(_, group)| *group);
        Ok(groups.into_iter().chain(values).map(|(id, _)| id).collect())
    }

    async fn sync_value(
        &self,
        transport: &dyn SyncTransport,
        peer: &str,
        id: &CoID,
        report: &mut SyncReport,
    ) -> Result<()> {
        let local = self.known_state(id)?;
        let load = SyncRequest::Load { known: local };
        let (remote, content) = match self.request(transport, &load).await? {
            SyncResponse::Content { known, content } => (known, content),
            other => return Err(unexpected("content", &other).into()),
        };
        if let Some(content) = content {
            report.received += self.receive(content)?;
        }

        let acknowledged = self
            .peer_state(peer)
            .and_then(|state| state.acknowledged(id).cloned());
        if acknowledged.is_some_and(|acknowledged| !remote.covers(&acknowledged)) {
            warn!(peer = %peer, co_id = %id, "Peer lost acknowledged transactions");
        }
        match self.content_since(&remote)? {
            Some(content) => {
                let count = content.transactions.len();
                match self.request(transport, &SyncRequest::Push { content }).await? {
                    SyncResponse::Ack { known } => {
                        report.sent += count;
                        self.with_peer(peer, |state| state.record(known));
                    }
                    other => return Err(unexpected("ack", &other).into()),
                }
            }
            None => self.with_peer(peer, |state| state.record(remote)),
        }
        debug!(peer = %peer, co_id = %id, "Value synced");
        report.values += 1;
        Ok(())
    }

    /// Send with retries on network failures.
    async fn request(
        &self,
        transport: &dyn SyncTransport,
        request: &SyncRequest,
    ) -> Result<SyncResponse> {
        let policy = &self.config().sync;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match transport.send(request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        peer = transport.peer_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Sync request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_retryable() => {
                    warn!(peer = transport.peer_id(), attempts = attempt, "Peer unreachable");
                    return Err(SyncError::PeerUnreachable {
                        peer: transport.peer_id().to_string(),
                        attempts: attempt,
                    }
                    .into());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
