//! The interface every type projection implements.

use serde_json::Value;

use crate::transaction::{CausalKey, Op};

/// Interprets operations into a materialized value.
///
/// Implementations must be order-independent: applying the same set of
/// `(key, change, op)` triples in any order yields the same [`Self::to_value`].
/// That property is what lets lazy and incremental materialization agree.
pub trait Projection {
    /// Apply operation number `change` of the transaction at `key`.
    ///
    /// Operations that do not apply to this projection are ignored.
    fn apply_op(&mut self, key: &CausalKey, change: u32, op: &Op);

    /// Apply every operation of one transaction.
    fn apply(&mut self, key: &CausalKey, ops: &[Op]) {
        for (change, op) in ops.iter().enumerate() {
            self.apply_op(key, change as u32, op);
        }
    }

    /// The JSON form of the current value.
    fn to_value(&self) -> Value;
}
