//! Per-DataItem latest-observation snapshot.
//!
//! Putting observations in sequence order yields the same `Checkpoint`
//! regardless of interleaving: a Sample/Event put simply replaces the
//! prior entry for that DataItem id; a Condition put merges into the
//! running [`ConditionSet`] for that id instead of replacing it.

use std::collections::BTreeMap;

use crate::observation::{Observation, ObservationValue};

/// Snapshot of the latest observation (or condition set) per DataItem id,
/// as of some buffer sequence.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    entries: BTreeMap<String, Observation>,
}

impl Checkpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one observation into the checkpoint. For Condition values this
    /// merges the activation set (the Observation already carries the
    /// fully-merged set, produced by `DataItem::apply_condition`); for all
    /// other representations it is a plain replace.
    pub fn put(&mut self, obs: Observation) {
        match &obs.value {
            ObservationValue::Condition(_) => {
                self.entries.insert(obs.data_item_id.clone(), obs);
            }
            _ => {
                self.entries.insert(obs.data_item_id.clone(), obs);
            }
        }
    }

    pub fn get(&self, data_item_id: &str) -> Option<&Observation> {
        self.entries.get(data_item_id)
    }

    /// Returns a copy containing only the DataItem ids in `filter`, or a
    /// full copy if `filter` is empty.
    pub fn filter(&self, filter: &[String]) -> Checkpoint {
        if filter.is_empty() {
            return self.clone();
        }
        let mut out = Checkpoint::new();
        for id in filter {
            if let Some(obs) = self.entries.get(id) {
                out.entries.insert(id.clone(), obs.clone());
            }
        }
        out
    }

    /// All entries, ordered by DataItem id, suitable for serializing a
    /// "current" document.
    pub fn to_observations(&self) -> Vec<Observation> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::ObservationValue;
    use chrono::Utc;

    fn obs(id: &str, seq: u64, v: &str) -> Observation {
        Observation::new(id, Utc::now(), ObservationValue::Scalar(v.into())).with_sequence(seq)
    }

    #[test]
    fn replaying_in_sequence_order_is_deterministic() {
        let mut a = Checkpoint::new();
        a.put(obs("x", 1, "a"));
        a.put(obs("x", 2, "b"));
        a.put(obs("y", 3, "c"));

        let mut b = Checkpoint::new();
        b.put(obs("y", 3, "c"));
        b.put(obs("x", 1, "a"));
        b.put(obs("x", 2, "b"));

        assert_eq!(a.get("x").unwrap().sequence, b.get("x").unwrap().sequence);
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn filter_restricts_to_named_ids() {
        let mut cp = Checkpoint::new();
        cp.put(obs("x", 1, "a"));
        cp.put(obs("y", 2, "b"));
        let filtered = cp.filter(&["x".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.get("x").is_some());
    }
}
