//! Change subscriptions.
//!
//! A subscription is a task listening on a CoValue's change channel. The
//! channel only carries a counter, so a burst of changes collapses into one
//! wake-up; the task then yields once so writes landing in the same scheduling
//! tick are folded into the same snapshot.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::WeakNode;
use crate::id::CoID;
use crate::materialize::Materialized;

/// Handle to a running subscription. Dropping it cancels the subscription.
#[derive(Debug)]
pub struct Subscription {
    id: CoID,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn spawn<F>(
        id: CoID,
        node: WeakNode,
        mut changes: watch::Receiver<u64>,
        callback: F,
    ) -> Self
    where
        F: Fn(Materialized) + Send + 'static,
    {
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            deliver(&node, &task_id, &callback);
            while changes.changed().await.is_ok() {
                tokio::task::yield_now().await;
                changes.borrow_and_update();
                if !deliver(&node, &task_id, &callback) {
                    break;
                }
            }
            debug!(co_id = %task_id, "Subscription ended");
        });
        Self { id, task }
    }

    /// The CoValue this subscription observes.
    pub fn id(&self) -> &CoID {
        &self.id
    }

    /// Stop notifications. Merges in progress are unaffected.
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read and hand over one snapshot. Returns false once the node is gone.
fn deliver<F: Fn(Materialized)>(node: &WeakNode, id: &CoID, callback: &F) -> bool {
    let Some(node) = node.upgrade() else {
        return false;
    };
    match node.read(id) {
        Ok(snapshot) => callback(snapshot),
        Err(err) => warn!(co_id = %id, error = %err, "Subscription could not read value"),
    }
    true
}
