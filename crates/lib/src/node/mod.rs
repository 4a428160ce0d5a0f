//!
//! The engine's entry point.
//!
//! A [`Node`] is one replica acting as one agent. It owns the registry of
//! loaded CoValues, writes verified state through to [`Storage`], authors
//! transactions for local edits and notifies subscribers when values change.
//!
//! `Node` is a cheap-to-clone handle around shared state. Background tasks
//! hold a [`WeakNode`] so they never keep a dropped node alive.
//!
//! ```
//! use std::sync::Arc;
//! use covalent::{CoValueType, Edit, LocalKeyring, Node, NodeConfig, storage::InMemory};
//! use serde_json::json;
//!
//! # fn main() -> covalent::Result<()> {
//! let node = Node::open(
//!     Arc::new(LocalKeyring::generate()),
//!     Arc::new(InMemory::new()),
//!     NodeConfig::default(),
//! )?;
//! let group = node.create_group()?;
//! let todo = node.create(&group, CoValueType::List, json!(["milk"]), None)?;
//! node.mutate(&todo, vec![Edit::push("eggs")])?;
//! assert_eq!(node.read(&todo)?.value, json!(["milk", "eggs"]));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod registry;
pub mod subscription;

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};

use handle_trait::Handle;
use serde_json::Value;
use tracing::{debug, info, warn};

pub use config::{NodeConfig, SyncConfig};
pub use errors::NodeError;
pub use registry::CoValueRegistry;
pub use subscription::Subscription;

use self::registry::{LoadedCoValue, Slot};
use crate::auth::group::{revelation_field, sealed_key_field};
use crate::auth::{self, AuthError, GroupState, KeyResolver, Role, capabilities_for};
use crate::constants::READ_KEY_FIELD;
use crate::covalue::{CoValueCore, GapReport, KnownSessions};
use crate::crdt::{CRDTError, Edit, initial_edits, plan};
use crate::crypto::{KeyID, KeySecret, seal};
use crate::header::{CoValueHeader, CoValueType, Ruleset};
use crate::id::{CoID, SessionID, TransactionID};
use crate::identity::{AgentID, KeyProvider};
use crate::materialize::{MaterializeContext, Materialized, Stamp};
use crate::storage::Storage;
use crate::sync::PeerState;
use crate::transaction::{CausalKey, Changes, Op, Transaction};
use crate::{Clock, Result, SystemClock};

/// Shared state behind [`Node`] handles.
pub(crate) struct NodeInner {
    keys: Arc<dyn KeyProvider>,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    config: NodeConfig,
    device_id: String,
    registry: CoValueRegistry,
    /// Read keys learned at runtime, in addition to the provider's.
    read_keys: RwLock<HashMap<KeyID, KeySecret>>,
    key_generation: AtomicU64,
    /// Sync progress per peer id.
    peers: Mutex<HashMap<String, PeerState>>,
}

impl std::fmt::Debug for NodeInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInner")
            .field("agent", &self.keys.agent_secret().agent_id())
            .field("device_id", &self.device_id)
            .field("storage", &self.storage)
            .field("clock", &self.clock)
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("key_generation", &self.key_generation)
            .finish_non_exhaustive()
    }
}

/// One replica of the CoValue store.
#[derive(Clone, Debug, Handle)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Weak reference to a [`Node`].
#[derive(Clone, Debug, Handle)]
pub struct WeakNode {
    inner: Weak<NodeInner>,
}

fn lock(slot: &Slot) -> MutexGuard<'_, LoadedCoValue> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Node {
    /// Open a node acting as the provider's agent on top of `storage`.
    pub fn open(
        keys: Arc<dyn KeyProvider>,
        storage: Arc<dyn Storage>,
        config: NodeConfig,
    ) -> Result<Self> {
        Self::open_internal(keys, storage, config, Arc::new(SystemClock))
    }

    /// Open a node whose timestamps come from `clock`.
    #[cfg(any(test, feature = "testing"))]
    pub fn open_with_clock(
        keys: Arc<dyn KeyProvider>,
        storage: Arc<dyn Storage>,
        config: NodeConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::open_internal(keys, storage, config, clock)
    }

    fn open_internal(
        keys: Arc<dyn KeyProvider>,
        storage: Arc<dyn Storage>,
        config: NodeConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let stored = storage.ids()?.len();
        let device_id = config
            .device_id
            .clone()
            .unwrap_or_else(|| keys.device_id().to_string());
        let node = Self {
            inner: Arc::new(NodeInner {
                keys,
                storage,
                clock,
                config,
                device_id,
                registry: CoValueRegistry::new(),
                read_keys: RwLock::new(HashMap::new()),
                key_generation: AtomicU64::new(0),
                peers: Mutex::new(HashMap::new()),
            }),
        };
        info!(agent = %node.agent_id(), stored, "Opened node");
        Ok(node)
    }

    /// Downgrade to a weak reference.
    pub fn downgrade(&self) -> WeakNode {
        WeakNode {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The agent this node writes as.
    pub fn agent_id(&self) -> AgentID {
        self.inner.keys.agent_secret().agent_id()
    }

    /// Device id used in this node's session ids.
    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &CoValueRegistry {
        &self.inner.registry
    }

    pub(crate) fn now(&self) -> u64 {
        self.inner.clock.now_millis()
    }

    pub(crate) fn now_rfc3339(&self) -> String {
        self.inner.clock.now_rfc3339()
    }

    pub(crate) fn peers(&self) -> MutexGuard<'_, HashMap<String, PeerState>> {
        self.inner
            .peers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids of every CoValue held in memory or in storage.
    pub fn ids(&self) -> Result<Vec<CoID>> {
        let mut ids: BTreeSet<CoID> = self.inner.storage.ids()?.into_iter().collect();
        ids.extend(self.inner.registry.ids());
        Ok(ids.into_iter().collect())
    }

    // === Lifecycle ===

    pub(crate) fn slot(&self, id: &CoID) -> Result<Slot> {
        match self.inner.registry.get(id) {
            Some(slot) => Ok(slot),
            None => self.load_slot(id),
        }
    }

    fn load_slot(&self, id: &CoID) -> Result<Slot> {
        let stored = self
            .inner
            .storage
            .load(id)?
            .ok_or_else(|| NodeError::NotFound { id: id.clone() })?;
        let mut core = CoValueCore::with_id(id, stored.header)?;
        let now = self.now();
        for tx in stored.sessions.into_values().flatten() {
            if let Err(err) = core.ingest(tx, now) {
                warn!(co_id = %id, error = %err, "Stored transaction rejected on load");
            }
        }
        debug!(
            co_id = %id,
            transactions = core.transaction_count(),
            "Loaded CoValue from storage"
        );
        Ok(self
            .inner
            .registry
            .insert(core, self.inner.config.materialization))
    }

    /// Make sure `id` is in memory, rebuilding it from storage if needed.
    pub fn load(&self, id: &CoID) -> Result<()> {
        self.slot(id).map(|_| ())
    }

    /// Drop `id` from memory. Storage and subscriptions are kept.
    pub fn evict(&self, id: &CoID) -> bool {
        let evicted = self.inner.registry.evict(id);
        self.inner.registry.prune_channels();
        if evicted {
            debug!(co_id = %id, "Evicted CoValue");
        }
        evicted
    }

    /// The header of `id`.
    pub fn header(&self, id: &CoID) -> Result<CoValueHeader> {
        let slot = self.slot(id)?;
        let header = lock(&slot).core.header().clone();
        Ok(header)
    }

    // === Creation ===

    /// Create a CoValue owned by `group`, optionally seeded with `initial`.
    pub fn create(
        &self,
        group: &CoID,
        co_type: CoValueType,
        initial: Value,
        meta: Option<Value>,
    ) -> Result<CoID> {
        self.create_with_ruleset(
            co_type,
            Ruleset::OwnedByGroup {
                group: group.clone(),
            },
            initial,
            meta,
        )
    }

    /// Create a CoValue under an explicit ruleset.
    pub fn create_with_ruleset(
        &self,
        co_type: CoValueType,
        ruleset: Ruleset,
        initial: Value,
        meta: Option<Value>,
    ) -> Result<CoID> {
        if let Ruleset::OwnedByGroup { group } = &ruleset {
            let slot = self.slot(group)?;
            if !lock(&slot).core.header().is_group() {
                return Err(AuthError::NotAGroup { id: group.clone() }.into());
            }
        }
        let edits = initial_edits(co_type, &initial)?;
        let header = CoValueHeader::new(co_type, ruleset, meta, self.now());
        let core = CoValueCore::new(header)?;
        let id = core.id().clone();
        self.inner.storage.put_header(&id, core.header())?;
        self.inner
            .registry
            .insert(core, self.inner.config.materialization);
        if !edits.is_empty() {
            self.mutate(&id, edits)?;
        }
        info!(co_id = %id, co_type = %co_type, "Created CoValue");
        Ok(id)
    }

    /// Create a group administered by this agent, with a fresh read key.
    pub fn create_group(&self) -> Result<CoID> {
        let agent = self.agent_id();
        let id = self.create_with_ruleset(
            CoValueType::Map,
            Ruleset::Group {
                initial_admin: agent.clone(),
            },
            Value::Null,
            None,
        )?;
        let key_id = KeyID::generate();
        let secret = KeySecret::generate();
        let sealed = seal(secret.as_bytes(), &[agent.sealer()?])?;
        self.learn_key(key_id.clone(), secret);
        self.mutate(
            &id,
            vec![
                Edit::set(agent.to_string(), Role::Admin.to_value()),
                Edit::set(
                    sealed_key_field(&key_id, &agent),
                    serde_json::to_value(&sealed)?,
                ),
                Edit::set(READ_KEY_FIELD, key_id.to_string()),
            ],
        )?;
        Ok(id)
    }

    // === Reading and writing ===

    /// The current materialized value of `id`.
    ///
    /// A group reads as its [`GroupState`], so fields the role table refused
    /// (malformed roles, private changes) never show up in its value.
    pub fn read(&self, id: &CoID) -> Result<Materialized> {
        let slot = self.slot(id)?;
        let mut entry = lock(&slot);
        let LoadedCoValue { core, materializer } = &mut *entry;
        let group = self.governing_group(core)?;
        if let (true, Some(state)) = (core.header().is_group(), group.as_ref()) {
            return Ok(Materialized {
                value: state.to_value(),
                rejected: state.rejected(),
                hidden: 0,
            });
        }
        let known = self.known_keys();
        let resolver = KeyResolver::new(self.inner.keys.as_ref(), &known, group.as_ref());
        let ctx = MaterializeContext {
            group: group.as_ref(),
            keys: &resolver,
            stamp: self.stamp(group.as_ref()),
        };
        Ok(materializer.materialize(core, &ctx))
    }

    /// Apply `edits` as one transaction authored by this node.
    ///
    /// Fails without side effects when this agent may not write the value,
    /// when an edit does not fit its type, or when an owned value's read key
    /// is unavailable.
    pub fn mutate(&self, id: &CoID, edits: Vec<Edit>) -> Result<TransactionID> {
        let slot = self.slot(id)?;
        let (tx, is_group) = {
            let mut entry = lock(&slot);
            let tx = self.commit(&mut entry, &edits)?;
            (tx, entry.core.header().is_group())
        };
        debug!(co_id = %id, tx = %tx.id(), edits = edits.len(), "Committed transaction");
        self.changed(id, is_group);
        Ok(tx.id())
    }

    fn commit(&self, entry: &mut LoadedCoValue, edits: &[Edit]) -> Result<Transaction> {
        let LoadedCoValue { core, materializer } = entry;
        let header = core.header().clone();
        let group = self.governing_group(core)?;
        if let (Some(owner), None) = (header.owner_group(), &group) {
            return Err(AuthError::GroupUnavailable { id: owner.clone() }.into());
        }

        let agent = self.agent_id();
        let session = SessionID::derive(core.id(), &agent, &self.inner.device_id);
        let key = CausalKey {
            made_at: self.next_made_at(core, group.as_ref()),
            tx_index: core.next_index(&session),
            session_id: session,
        };
        auth::authorize(&header, group.as_ref(), &agent, &key)?;

        let known = self.known_keys();
        let resolver = KeyResolver::new(self.inner.keys.as_ref(), &known, group.as_ref());
        let ctx = MaterializeContext {
            group: group.as_ref(),
            keys: &resolver,
            stamp: self.stamp(group.as_ref()),
        };
        let view = materializer.project(core, &ctx);
        let ops = plan(&view, edits, &key)?;
        let caps = capabilities_for(&header);
        if let Some(Op::Set { key: field, .. } | Op::Del { key: field }) =
            ops.iter().find(|op| !caps.accepts(op))
        {
            return Err(CRDTError::InvalidValue {
                reason: format!("{:?} maps do not accept the key {field}", caps.kind),
            }
            .into());
        }

        let changes = match (header.owner_group(), group.as_ref()) {
            (Some(owner), Some(group)) => {
                let key_id = group.read_key_id().ok_or_else(|| AuthError::NoReadKey {
                    group: owner.clone(),
                })?;
                let secret = resolver
                    .resolve(&key_id)
                    .ok_or_else(|| AuthError::ReadKeyUnavailable {
                        key_id: key_id.clone(),
                    })?;
                Changes::seal(&ops, key_id, &secret)?
            }
            _ => Changes::Trusting { changes: ops },
        };

        let tx = Transaction::sign(
            core.id(),
            key,
            changes,
            None,
            &self.inner.keys.agent_secret().signer,
        )?;
        let before = core.known_state();
        core.ingest(tx.clone(), self.now())?;
        let (written, persisted) = self.persist(core, &before);
        if written == 0 {
            persisted?;
        }
        Ok(tx)
    }

    /// Write everything appended to `core` since `before` to storage.
    ///
    /// Stops at the first failure and undoes the unwritten appends in memory,
    /// so memory never holds a transaction storage lacks. Returns how many
    /// transactions were written.
    fn persist(&self, core: &mut CoValueCore, before: &KnownSessions) -> (usize, Result<()>) {
        let mut written = before.clone();
        let mut count = 0;
        for tx in core.transactions_since(before) {
            if let Err(err) = self.inner.storage.append(core.id(), &tx) {
                let undone = core.truncate_to(&written);
                warn!(
                    co_id = %core.id(),
                    written = count,
                    undone,
                    error = %err,
                    "Storage append failed"
                );
                return (count, Err(err.into()));
            }
            *written.entry(tx.session_id.clone()).or_insert(0) += 1;
            count += 1;
        }
        (count, Ok(()))
    }

    /// A `madeAt` after everything this writer has seen of the value and its
    /// group, even if the local clock lags.
    fn next_made_at(&self, core: &CoValueCore, group: Option<&GroupState>) -> u64 {
        let after = |key: Option<&CausalKey>| key.map_or(0, |key| key.made_at + 1);
        self.now()
            .max(after(core.latest_key().as_ref()))
            .max(after(group.and_then(GroupState::latest_key)))
    }

    /// Add verified transactions (and, for unknown values, their header).
    ///
    /// Transactions failing verification are dropped and logged; the rest are
    /// kept. Returns how many transactions were appended, including buffered
    /// ones this delivery unblocked. When storage fails partway, what was
    /// written stays and is announced to subscribers before the error returns.
    pub fn ingest(
        &self,
        id: &CoID,
        header: Option<CoValueHeader>,
        transactions: Vec<Transaction>,
    ) -> Result<usize> {
        let slot = match self.slot(id) {
            Ok(slot) => slot,
            Err(err) if err.is_not_found() => {
                let header = header.ok_or_else(|| NodeError::HeaderUnavailable { id: id.clone() })?;
                let core = CoValueCore::with_id(id, header)?;
                self.inner.storage.put_header(id, core.header())?;
                self.inner
                    .registry
                    .insert(core, self.inner.config.materialization)
            }
            Err(err) => return Err(err),
        };

        let (appended, persisted, is_group) = {
            let mut entry = lock(&slot);
            let before = entry.core.known_state();
            let now = self.now();
            for tx in transactions {
                if let Err(err) = entry.core.ingest(tx, now) {
                    debug!(co_id = %id, error = %err, "Incoming transaction dropped");
                }
            }
            let (appended, persisted) = self.persist(&mut entry.core, &before);
            (appended, persisted, entry.core.header().is_group())
        };
        if appended > 0 {
            self.changed(id, is_group);
        }
        persisted.map(|()| appended)
    }

    /// Sessions of `id` whose buffered transactions have waited longer than
    /// the configured window for a predecessor.
    pub fn unresolved_gaps(&self, id: &CoID) -> Result<Vec<GapReport>> {
        let slot = self.slot(id)?;
        let gaps = lock(&slot)
            .core
            .unresolved_gaps(self.now(), self.inner.config.gap_window_ms);
        for gap in &gaps {
            warn!(
                co_id = %id,
                session = %gap.session_id,
                expected_index = gap.expected_index,
                waiting_ms = gap.waiting_ms,
                "Unresolved gap"
            );
        }
        Ok(gaps)
    }

    // === Subscriptions ===

    /// Call `callback` with the current value now and after every change.
    ///
    /// Bursts of changes within one scheduling tick produce one call. Must be
    /// called from within a Tokio runtime.
    pub fn subscribe<F>(&self, id: &CoID, callback: F) -> Result<Subscription>
    where
        F: Fn(Materialized) + Send + 'static,
    {
        tokio::runtime::Handle::try_current().map_err(|_| NodeError::NoRuntime)?;
        self.load(id)?;
        let changes = self.inner.registry.watch(id);
        Ok(Subscription::spawn(
            id.clone(),
            self.downgrade(),
            changes,
            callback,
        ))
    }

    fn changed(&self, id: &CoID, is_group: bool) {
        self.inner.registry.notify(id);
        if is_group {
            for dependent in self.inner.registry.dependents(id) {
                self.inner.registry.notify(&dependent);
            }
        }
    }

    // === Groups and keys ===

    /// Materialized state of a group.
    pub fn group_state(&self, group: &CoID) -> Result<GroupState> {
        let slot = self.slot(group)?;
        let state = GroupState::build(&lock(&slot).core)?;
        Ok(state)
    }

    /// The group whose roles govern writes to `core`, if it is available.
    fn governing_group(&self, core: &CoValueCore) -> Result<Option<GroupState>> {
        match &core.header().ruleset {
            Ruleset::Group { .. } => Ok(Some(GroupState::build(core)?)),
            Ruleset::OwnedByGroup { group } => match self.group_state(group) {
                Ok(state) => Ok(Some(state)),
                Err(err) if err.is_not_found() => {
                    debug!(co_id = %core.id(), group = %group, "Owning group not available");
                    Ok(None)
                }
                Err(err) => Err(err),
            },
            Ruleset::Account { .. } | Ruleset::UnsafeAllowAll => Ok(None),
        }
    }

    fn stamp(&self, group: Option<&GroupState>) -> Stamp {
        Stamp {
            group: group.map(GroupState::version),
            key_generation: self.inner.key_generation.load(Ordering::Acquire),
            provider_generation: self.inner.keys.key_generation(),
        }
    }

    fn known_keys(&self) -> HashMap<KeyID, KeySecret> {
        self.inner
            .read_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn learn_key(&self, key_id: KeyID, secret: KeySecret) {
        self.inner
            .read_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key_id, secret);
        self.inner.key_generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Accept a read key delivered out of band. Values it unlocks become
    /// readable on the next read without refetching anything.
    pub fn add_read_key(&self, key_id: KeyID, secret: KeySecret) {
        debug!(key_id = %key_id, "Read key delivered");
        self.learn_key(key_id, secret);
        for id in self.inner.registry.ids() {
            self.inner.registry.notify(&id);
        }
    }

    /// The group's current read key, for handing to a reader out of band.
    pub fn current_read_key(&self, group: &CoID) -> Result<(KeyID, KeySecret)> {
        let state = self.group_state(group)?;
        let key_id = state
            .read_key_id()
            .ok_or_else(|| AuthError::NoReadKey {
                group: group.clone(),
            })?;
        let secret = self.group_key(&state, &key_id)?;
        Ok((key_id, secret))
    }

    fn group_key(&self, state: &GroupState, key_id: &KeyID) -> Result<KeySecret> {
        let known = self.known_keys();
        KeyResolver::new(self.inner.keys.as_ref(), &known, Some(state))
            .resolve(key_id)
            .ok_or_else(|| {
                AuthError::ReadKeyUnavailable {
                    key_id: key_id.clone(),
                }
                .into()
            })
    }

    /// Give `member` a role in `group`, sealing the current read key to them
    /// unless the role is [`Role::Revoked`]. Only admins may do this.
    pub fn set_role(&self, group: &CoID, member: &AgentID, role: Role) -> Result<TransactionID> {
        let mut edits = vec![Edit::set(member.to_string(), role.to_value())];
        if role.can_read() {
            let state = self.group_state(group)?;
            if let Some(key_id) = state.read_key_id() {
                let secret = self.group_key(&state, &key_id)?;
                let sealed = seal(secret.as_bytes(), &[member.sealer()?])?;
                edits.push(Edit::set(
                    sealed_key_field(&key_id, member),
                    serde_json::to_value(&sealed)?,
                ));
            }
        }
        let tx = self.mutate(group, edits)?;
        info!(group = %group, member = %member, role = %role, "Set member role");
        Ok(tx)
    }

    /// Revoke `member` and rotate the read key so later content stays hidden
    /// from them. Returns the new key id.
    pub fn remove_member(&self, group: &CoID, member: &AgentID) -> Result<KeyID> {
        self.set_role(group, member, Role::Revoked)?;
        self.rotate_read_key(group)
    }

    /// Replace the group's read key.
    ///
    /// The new key is sealed to every member who may read, and the previous
    /// key is published encrypted under the new one so older content stays
    /// readable to anyone holding only the newest key.
    pub fn rotate_read_key(&self, group: &CoID) -> Result<KeyID> {
        let state = self.group_state(group)?;
        let new_id = KeyID::generate();
        let new_secret = KeySecret::generate();

        let mut edits = Vec::new();
        for (member, role) in state.members() {
            if !role.can_read() {
                continue;
            }
            let sealed = seal(new_secret.as_bytes(), &[member.sealer()?])?;
            edits.push(Edit::set(
                sealed_key_field(&new_id, &member),
                serde_json::to_value(&sealed)?,
            ));
        }
        if let Some(old_id) = state.read_key_id() {
            let old_secret = self.group_key(&state, &old_id)?;
            edits.push(Edit::set(
                revelation_field(&old_id, &new_id),
                new_secret.encrypt(old_secret.as_bytes())?,
            ));
        }
        edits.push(Edit::set(READ_KEY_FIELD, new_id.to_string()));

        self.learn_key(new_id.clone(), new_secret);
        self.mutate(group, edits)?;
        info!(group = %group, key_id = %new_id, "Rotated read key");
        Ok(new_id)
    }
}

impl WeakNode {
    /// Upgrade to a strong reference, if the node is still alive.
    pub fn upgrade(&self) -> Option<Node> {
        self.inner.upgrade().map(|inner| Node { inner })
    }
}
