//! Turning verified state into a materialized value.
//!
//! Two interchangeable strategies sit behind [`Materializer`]:
//!
//! - [`Lazy`] replays every transaction in causal order on each read.
//! - [`Incremental`] keeps the projection and feeds it only transactions
//!   appended since the last read.
//!
//! Both admit transactions through the same filter (authority at the causal
//! key, then decryption) into order-independent projections, so they cannot be
//! told apart. Anything that changes the filter's answers (the owning group,
//! the node's known read keys or the key provider's) is captured in a
//! [`Stamp`]; a stamp change makes the incremental strategy start over.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{self, GroupState, KeyResolver, capabilities_for};
use crate::covalue::{CoValueCore, CoreVersion};
use crate::crdt::{Projection, Projector};
use crate::id::SessionID;
use crate::transaction::Transaction;

/// A CoValue's current value plus what was left out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Materialized {
    pub value: Value,
    /// Transactions excluded because their writer lacked authority.
    pub rejected: usize,
    /// Transactions whose content this reader cannot decrypt yet.
    pub hidden: usize,
}

/// Which [`Materializer`] a node uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterializationStrategy {
    Lazy,
    #[default]
    Incremental,
}

/// Everything outside the CoValue's own log that admission depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stamp {
    pub group: Option<CoreVersion>,
    /// Read keys learned by the node.
    pub key_generation: u64,
    /// Read keys added to the key provider.
    pub provider_generation: u64,
}

/// Inputs for one materialization.
pub struct MaterializeContext<'a> {
    pub group: Option<&'a GroupState>,
    pub keys: &'a KeyResolver<'a>,
    pub stamp: Stamp,
}

/// A materialization strategy.
pub trait Materializer: Send + Sync + std::fmt::Debug {
    fn strategy(&self) -> MaterializationStrategy;

    fn materialize(&mut self, core: &CoValueCore, ctx: &MaterializeContext<'_>) -> Materialized;

    /// The projection behind the current value, for resolving index-based edits.
    fn project(&mut self, core: &CoValueCore, ctx: &MaterializeContext<'_>) -> Projector;
}

/// Build the materializer for `strategy`.
pub fn materializer(strategy: MaterializationStrategy) -> Box<dyn Materializer> {
    match strategy {
        MaterializationStrategy::Lazy => Box::new(Lazy),
        MaterializationStrategy::Incremental => Box::new(Incremental::default()),
    }
}

#[derive(Debug, Clone)]
struct Fold {
    projector: Projector,
    rejected: usize,
    hidden: usize,
}

impl Fold {
    fn new(core: &CoValueCore) -> Self {
        Self {
            projector: Projector::new(core.header().co_type),
            rejected: 0,
            hidden: 0,
        }
    }

    fn admit(&mut self, core: &CoValueCore, tx: &Transaction, ctx: &MaterializeContext<'_>) {
        let header = core.header();
        let key = tx.causal_key();
        let agent = tx.session_id.agent();

        if let Err(err) = auth::authorize(header, ctx.group, &agent, &key) {
            warn!(
                co_id = %core.id(),
                session = %tx.session_id,
                tx_index = tx.tx_index,
                error = %err,
                "Unauthorized writer: transaction excluded"
            );
            self.rejected += 1;
            return;
        }

        let secret = tx.changes.key_id().and_then(|key_id| ctx.keys.resolve(key_id));
        let ops = match tx.changes.open(secret.as_ref()) {
            Ok(ops) => ops,
            Err(err) => {
                debug!(
                    co_id = %core.id(),
                    session = %tx.session_id,
                    tx_index = tx.tx_index,
                    error = %err,
                    "Transaction content hidden"
                );
                self.hidden += 1;
                return;
            }
        };

        let caps = capabilities_for(header);
        for (change, op) in ops.iter().enumerate() {
            if caps.accepts(op) {
                self.projector.apply_op(&key, change as u32, op);
            }
        }
    }

    fn snapshot(&self) -> Materialized {
        Materialized {
            value: self.projector.to_value(),
            rejected: self.rejected,
            hidden: self.hidden,
        }
    }
}

/// Recompute from scratch on every read.
#[derive(Debug, Default)]
pub struct Lazy;

impl Materializer for Lazy {
    fn strategy(&self) -> MaterializationStrategy {
        MaterializationStrategy::Lazy
    }

    fn materialize(&mut self, core: &CoValueCore, ctx: &MaterializeContext<'_>) -> Materialized {
        Lazy::replay(core, ctx).snapshot()
    }

    fn project(&mut self, core: &CoValueCore, ctx: &MaterializeContext<'_>) -> Projector {
        Lazy::replay(core, ctx).projector
    }
}

impl Lazy {
    fn replay(core: &CoValueCore, ctx: &MaterializeContext<'_>) -> Fold {
        let mut fold = Fold::new(core);
        for tx in core.ordered_transactions() {
            fold.admit(core, tx, ctx);
        }
        fold
    }
}

/// Apply only what was appended since the previous read.
#[derive(Debug, Default)]
pub struct Incremental {
    fold: Option<Fold>,
    applied: BTreeMap<SessionID, usize>,
    stamp: Stamp,
    core_version: CoreVersion,
    cached: Option<Materialized>,
}

impl Incremental {
    fn reset(&mut self, core: &CoValueCore, stamp: Stamp) {
        self.fold = Some(Fold::new(core));
        self.applied.clear();
        self.stamp = stamp;
        self.cached = None;
    }

    /// Feed the fold whatever was appended since the last call.
    fn advance(&mut self, core: &CoValueCore, ctx: &MaterializeContext<'_>) {
        let version = core.version();
        if self.fold.is_none()
            || self.stamp != ctx.stamp
            || self.core_version.epoch != version.epoch
        {
            self.reset(core, ctx.stamp);
        }
        let fresh = self.core_version == version && self.cached.is_some();
        let fold = self.fold.get_or_insert_with(|| Fold::new(core));
        if !fresh {
            for (session, log) in core.sessions() {
                let start = self.applied.get(session).copied().unwrap_or(0);
                for tx in log.iter().skip(start) {
                    fold.admit(core, tx, ctx);
                }
                self.applied.insert(session.clone(), log.len());
            }
            self.core_version = version;
            self.cached = Some(fold.snapshot());
        }
    }
}

impl Materializer for Incremental {
    fn strategy(&self) -> MaterializationStrategy {
        MaterializationStrategy::Incremental
    }

    fn materialize(&mut self, core: &CoValueCore, ctx: &MaterializeContext<'_>) -> Materialized {
        self.advance(core, ctx);
        match &self.cached {
            Some(cached) => cached.clone(),
            None => Lazy.materialize(core, ctx),
        }
    }

    fn project(&mut self, core: &CoValueCore, ctx: &MaterializeContext<'_>) -> Projector {
        self.advance(core, ctx);
        match &self.fold {
            Some(fold) => fold.projector.clone(),
            None => Lazy.project(core, ctx),
        }
    }
}
