//! Fixed-capacity ring of observations with periodic checkpoints, so that
//! "current" can be reconstructed without replaying the whole buffer and
//! "sample" can page through history by sequence.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::checkpoint::Checkpoint;
use crate::error::{AgentError, Result};
use crate::observation::Observation;
use crate::observer::ObserverRegistry;

struct Inner {
    capacity: usize,
    stride: usize,
    slots: Vec<Option<Observation>>,
    first_sequence: u64,
    next_sequence: u64,
    /// Checkpoint anchored at `first_sequence`, rolled forward by merging
    /// each evicted observation into it as it leaves the ring.
    base: Checkpoint,
    /// Running head checkpoint, always equal to `current(at = next_sequence - 1)`.
    head: Checkpoint,
    /// Stride checkpoints taken every `stride` pushes, keyed by the sequence
    /// at which they were taken, used to bound the replay cost of `current(at)`.
    stride_checkpoints: BTreeMap<u64, Checkpoint>,
    observers: ObserverRegistry,
}

impl Inner {
    fn slot_index(&self, sequence: u64) -> usize {
        (sequence as usize) % self.capacity
    }
}

/// A fixed-capacity ring buffer of [`Observation`]s plus its checkpoint
/// machinery. Writers serialize through a single write lock; readers take
/// a shared read lock, matching the spec's "writers single mutex, readers
/// shared lock" concurrency model.
pub struct CircularBuffer {
    inner: RwLock<Inner>,
}

impl CircularBuffer {
    pub fn new(capacity: usize, stride: usize) -> Self {
        assert!(capacity > 0, "buffer capacity must be non-zero");
        let stride = stride.max(1);
        CircularBuffer {
            inner: RwLock::new(Inner {
                capacity,
                stride,
                slots: vec![None; capacity],
                first_sequence: 0,
                next_sequence: 0,
                base: Checkpoint::new(),
                head: Checkpoint::new(),
                stride_checkpoints: BTreeMap::new(),
                observers: ObserverRegistry::new(),
            }),
        }
    }

    /// Assign the next sequence number, write the observation into its
    /// ring slot, evict the prior occupant into `base` if the ring was
    /// full, take a stride checkpoint if due, and notify observers.
    /// Returns the assigned sequence.
    pub fn push(&self, mut obs: Observation) -> u64 {
        let mut inner = self.inner.write();
        let sequence = inner.next_sequence;
        obs.sequence = sequence;

        let idx = inner.slot_index(sequence);
        let full = sequence - inner.first_sequence >= inner.capacity as u64;
        if full {
            if let Some(evicted) = inner.slots[idx].take() {
                inner.base.put(evicted);
            }
            inner.first_sequence += 1;
        }

        inner.slots[idx] = Some(obs.clone());
        inner.head.put(obs.clone());
        inner.next_sequence = sequence + 1;

        if inner.next_sequence % inner.stride as u64 == 0 {
            let snapshot = inner.head.clone();
            inner.stride_checkpoints.insert(inner.next_sequence - 1, snapshot);
            // Drop stride checkpoints that have fallen out of the live window.
            let first = inner.first_sequence;
            inner.stride_checkpoints.retain(|&seq, _| seq >= first);
        }

        let data_item_id = obs.data_item_id.clone();
        inner.observers.notify(&data_item_id, sequence);

        sequence
    }

    pub fn first_sequence(&self) -> u64 {
        self.inner.read().first_sequence
    }

    pub fn next_sequence(&self) -> u64 {
        self.inner.read().next_sequence
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().capacity
    }

    /// The observation at exactly `sequence`, or `None` if it has been
    /// evicted or not yet produced.
    pub fn at(&self, sequence: u64) -> Option<Observation> {
        let inner = self.inner.read();
        if sequence < inner.first_sequence || sequence >= inner.next_sequence {
            return None;
        }
        inner.slots[inner.slot_index(sequence)].clone()
    }

    /// Up to `count` observations starting at `max(from, first_sequence)`,
    /// restricted to `filter` (or unfiltered if empty). Returns the list
    /// plus the sequence of the first observation *not* included, for
    /// cursor advance.
    pub fn range(&self, from: u64, count: usize, filter: &[String]) -> (Vec<Observation>, u64) {
        let inner = self.inner.read();
        let start = from.max(inner.first_sequence);
        let mut out = Vec::with_capacity(count.min(inner.capacity));
        let mut seq = start;
        while seq < inner.next_sequence && out.len() < count {
            if let Some(obs) = &inner.slots[inner.slot_index(seq)] {
                if filter.is_empty() || filter.iter().any(|id| id == &obs.data_item_id) {
                    out.push(obs.clone());
                }
            }
            seq += 1;
        }
        (out, seq)
    }

    /// Reconstructs the Checkpoint as of `at_seq` (or the running head if
    /// `None`), masked by `filter`. Fails with `OutOfRange` if `at_seq` has
    /// already been evicted.
    pub fn current(&self, filter: &[String], at_seq: Option<u64>) -> Result<(u64, Checkpoint)> {
        let inner = self.inner.read();
        let Some(at_seq) = at_seq else {
            let seq = inner.next_sequence.saturating_sub(1);
            return Ok((seq, inner.head.filter(filter)));
        };

        if at_seq < inner.first_sequence {
            return Err(AgentError::OutOfRange(at_seq));
        }
        if at_seq >= inner.next_sequence {
            return Err(AgentError::OutOfRange(at_seq));
        }

        // Find the closest stride checkpoint at or before at_seq, else base.
        let mut checkpoint = inner
            .stride_checkpoints
            .range(..=at_seq)
            .next_back()
            .map(|(_, cp)| cp.clone())
            .unwrap_or_else(|| inner.base.clone());
        let replay_from = inner
            .stride_checkpoints
            .range(..=at_seq)
            .next_back()
            .map(|(seq, _)| seq + 1)
            .unwrap_or(inner.first_sequence);

        let mut seq = replay_from;
        while seq <= at_seq {
            if let Some(obs) = &inner.slots[inner.slot_index(seq)] {
                checkpoint.put(obs.clone());
            }
            seq += 1;
        }

        Ok((at_seq, checkpoint.filter(filter)))
    }

    /// Register a streaming observer for the given DataItem ids, with its
    /// cursor initialized to `from`.
    pub fn subscribe(&self, data_item_ids: &[String], from: u64) -> crate::observer::ChangeObserver {
        let mut inner = self.inner.write();
        crate::observer::subscribe(&mut inner.observers, data_item_ids, from)
    }

    pub fn gc_observers(&self) {
        self.inner.write().observers.gc();
    }
}
