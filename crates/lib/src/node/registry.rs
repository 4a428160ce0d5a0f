//! The set of CoValues a node holds in memory.
//!
//! Each loaded CoValue sits behind its own mutex together with its
//! materializer, so work on different values never contends. Change channels
//! are kept apart from the loaded set: evicting a value does not cancel its
//! subscribers, and reloading it reconnects them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::watch;

use crate::covalue::CoValueCore;
use crate::id::CoID;
use crate::materialize::{MaterializationStrategy, Materializer, materializer};

/// A CoValue in memory.
#[derive(Debug)]
pub(crate) struct LoadedCoValue {
    pub(crate) core: CoValueCore,
    pub(crate) materializer: Box<dyn Materializer>,
}

pub(crate) type Slot = Arc<Mutex<LoadedCoValue>>;

/// Store of loaded CoValues keyed by id.
#[derive(Debug, Default)]
pub struct CoValueRegistry {
    loaded: RwLock<HashMap<CoID, Slot>>,
    channels: RwLock<HashMap<CoID, watch::Sender<u64>>>,
}

impl CoValueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, id: &CoID) -> Option<Slot> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Add a core. If another caller loaded the same id first, theirs is kept.
    pub(crate) fn insert(&self, core: CoValueCore, strategy: MaterializationStrategy) -> Slot {
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        loaded
            .entry(core.id().clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(LoadedCoValue {
                    core,
                    materializer: materializer(strategy),
                }))
            })
            .clone()
    }

    /// Drop a core from memory. Returns whether it was loaded.
    pub fn evict(&self, id: &CoID) -> bool {
        self.loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    pub fn is_loaded(&self, id: &CoID) -> bool {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Ids of every loaded CoValue.
    pub fn ids(&self) -> Vec<CoID> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Loaded values owned by `group`.
    pub(crate) fn dependents(&self, group: &CoID) -> Vec<CoID> {
        let slots: Vec<Slot> = self
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        slots
            .iter()
            .filter_map(|slot| {
                let entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
                (entry.core.header().owner_group() == Some(group)).then(|| entry.core.id().clone())
            })
            .collect()
    }

    /// A receiver that observes every change notification for `id`.
    pub(crate) fn watch(&self, id: &CoID) -> watch::Receiver<u64> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(id.clone())
            .or_insert_with(|| watch::channel(0).0)
            .subscribe()
    }

    /// Signal that the value of `id` may have changed.
    pub(crate) fn notify(&self, id: &CoID) {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = channels.get(id) {
            sender.send_modify(|count| *count += 1);
        }
    }

    /// Drop channels nobody listens to any more.
    pub(crate) fn prune_channels(&self) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, sender| sender.receiver_count() > 0);
    }
}
