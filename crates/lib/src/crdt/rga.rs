//! Replicated Growable Array shared by lists and text.
//!
//! Every element records the element it was inserted after (its origin). The
//! sequence is the pre-order walk of the resulting tree with siblings visited
//! newest first: inserting after X places the new element directly behind X,
//! ahead of anything older that was also inserted after X. Concurrent inserts
//! at the same spot therefore interleave identically on every replica.
//!
//! Elements whose origin has not arrived yet are kept but stay invisible until
//! it does. Deletes only set a tombstone; deleted elements keep anchoring their
//! successors.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use crate::transaction::ElementId;

#[derive(Debug, Clone, PartialEq)]
struct Element<T> {
    value: T,
}

/// Order-independent sequence of `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rga<T> {
    elements: BTreeMap<ElementId, Element<T>>,
    roots: BTreeSet<Reverse<ElementId>>,
    children: BTreeMap<ElementId, BTreeSet<Reverse<ElementId>>>,
    deleted: BTreeSet<ElementId>,
}

impl<T> Default for Rga<T> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
            roots: BTreeSet::new(),
            children: BTreeMap::new(),
            deleted: BTreeSet::new(),
        }
    }
}

impl<T> Rga<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` right after `origin`. Re-inserting a known id is a no-op.
    pub fn insert(&mut self, id: ElementId, origin: Option<ElementId>, value: T) -> bool {
        if self.elements.contains_key(&id) {
            return false;
        }
        match origin {
            None => {
                self.roots.insert(Reverse(id.clone()));
            }
            Some(origin) => {
                self.children.entry(origin).or_default().insert(Reverse(id.clone()));
            }
        }
        self.elements.insert(id, Element { value });
        true
    }

    /// Tombstone `id`. May arrive before the insert it targets.
    pub fn delete(&mut self, id: ElementId) {
        self.deleted.insert(id);
    }

    pub fn is_deleted(&self, id: &ElementId) -> bool {
        self.deleted.contains(id)
    }

    /// Whether `id` has been inserted (visible, deleted or orphaned).
    pub fn contains(&self, id: &ElementId) -> bool {
        self.elements.contains_key(id)
    }

    /// Visible elements in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = (&ElementId, &T)> {
        self.walk()
            .into_iter()
            .filter(move |id| !self.deleted.contains(*id))
            .filter_map(move |id| self.elements.get(id).map(|e| (id, &e.value)))
    }

    /// Ids of the visible elements in sequence order.
    pub fn visible_ids(&self) -> Vec<ElementId> {
        self.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Number of visible elements.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every reachable element, deleted ones included, in sequence order.
    fn walk(&self) -> Vec<&ElementId> {
        let mut order = Vec::with_capacity(self.elements.len());
        let mut stack: Vec<&ElementId> = self.roots.iter().rev().map(|Reverse(id)| id).collect();
        while let Some(id) = stack.pop() {
            if !self.elements.contains_key(id) {
                continue;
            }
            order.push(id);
            if let Some(children) = self.children.get(id) {
                stack.extend(children.iter().rev().map(|Reverse(child)| child));
            }
        }
        order
    }
}
