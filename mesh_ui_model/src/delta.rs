//! Mesh UI Model: Bag Deltas
//!
//! Structured comparison of two attribute bags. Drives outbound
//! propagation: only the names that actually moved are pushed.

use crate::attribute_bag::AttributeBag;

/// Name-level difference between a bag before and after a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagDelta {
    pub added: Vec<(String, String)>,
    pub changed: Vec<(String, String)>,
    pub removed: Vec<String>,
}

impl BagDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Assignments that bring a remote copy of `before` up to `after`.
    /// Removed names are sent as empty values.
    pub fn assignments(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .added
            .iter()
            .chain(self.changed.iter())
            .cloned()
            .collect();
        out.extend(self.removed.iter().map(|n| (n.clone(), String::new())));
        out
    }
}

/// Compare two bags as name→value functions. Ordering follows `after`.
pub fn compare_bags(before: &AttributeBag, after: &AttributeBag) -> BagDelta {
    let old = before.to_map();
    let new = after.to_map();

    let mut delta = BagDelta::default();
    for name in after.names() {
        let value = new.get(&name).cloned().unwrap_or_default();
        match old.get(&name) {
            None => delta.added.push((name, value)),
            Some(prev) if *prev != value => delta.changed.push((name, value)),
            Some(_) => {}
        }
    }
    for name in before.names() {
        if !new.contains_key(&name) {
            delta.removed.push(name);
        }
    }
    delta
}
