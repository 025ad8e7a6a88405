//! Signal/wait between the buffer's writers and streaming HTTP readers.
//!
//! The registry shape is grounded directly on the teacher's
//! `StreamDispatcher`: a key (here, a DataItem id) maps to a list of
//! unbounded senders, a send failure is treated as "receiver gone" rather
//! than an error, and a `gc` pass sweeps anything `notify` didn't already
//! catch. The wait/heartbeat/timeout contract on top of that registry is
//! new — the teacher's dispatcher has no notion of a deadline, since its
//! callers just drained a stream to completion.

use std::collections::VecDeque;
use std::time::Duration;

use fnv::FnvHashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct ObserverRegistry {
    items: FnvHashMap<String, Vec<UnboundedSender<u64>>>,
    dropped: VecDeque<String>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: String, sender: UnboundedSender<u64>) {
        self.items.entry(key).or_default().push(sender);
    }

    /// Notify every sender registered for `key` that a new observation at
    /// `sequence` has arrived. Called from inside the buffer's push lock.
    pub fn notify(&mut self, key: &str, sequence: u64) {
        if let Some(senders) = self.items.get_mut(key) {
            let dropped = &mut self.dropped;
            senders.retain(|sender| {
                if sender.send(sequence).is_err() {
                    dropped.push_back(key.to_string());
                    false
                } else {
                    true
                }
            });
            if senders.is_empty() {
                self.items.remove(key);
            }
        }
    }

    pub fn gc(&mut self) {
        let dropped = &mut self.dropped;
        self.items.retain(|k, v| {
            v.retain(|sender| !sender.is_closed());
            if v.is_empty() {
                dropped.push_back(k.clone());
            }
            !v.is_empty()
        });
    }
}

/// The result of one `ChangeObserver::wait` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitEvent {
    /// At least one observation matching the filter arrived at or after the
    /// cursor; the caller should re-run `range`/`sample` from its cursor.
    DataReady,
    /// No match arrived within one heartbeat interval; the caller may emit
    /// an empty keep-alive chunk and call `wait` again.
    Heartbeat,
    /// No match arrived within the cumulative timeout.
    Timeout,
}

/// A single reader's subscription across a set of DataItem ids.
pub struct ChangeObserver {
    receiver: UnboundedReceiver<u64>,
    cursor: u64,
}

impl ChangeObserver {
    pub(crate) fn new(receiver: UnboundedReceiver<u64>, cursor: u64) -> Self {
        ChangeObserver { receiver, cursor }
    }

    /// Block (async) until a matching observation arrives, a heartbeat
    /// interval elapses, or the overall timeout is reached.
    ///
    /// Signaling is edge-triggered and wakeups may be spurious with respect
    /// to the cursor (e.g. a filter-id notified but already below cursor);
    /// this loops internally until a genuinely new sequence is seen or the
    /// deadline passes.
    pub async fn wait(&mut self, timeout: Duration, heartbeat: Duration) -> WaitEvent {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return WaitEvent::Timeout;
            }
            let remaining = deadline - now;
            let slice = heartbeat.min(remaining);

            match tokio::time::timeout(slice, self.receiver.recv()).await {
                Ok(Some(seq)) => {
                    if seq > self.cursor {
                        self.cursor = seq;
                        return WaitEvent::DataReady;
                    }
                    // Stale notification (already consumed); keep waiting.
                }
                Ok(None) => {
                    // Sender side fully dropped: buffer is gone, treat as timeout.
                    return WaitEvent::Timeout;
                }
                Err(_elapsed) => {
                    if Instant::now() >= deadline {
                        return WaitEvent::Timeout;
                    }
                    return WaitEvent::Heartbeat;
                }
            }
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn advance_cursor(&mut self, seq: u64) {
        if seq > self.cursor {
            self.cursor = seq;
        }
    }
}

/// Create a registered observer/sender pair for the given DataItem ids.
pub fn subscribe(registry: &mut ObserverRegistry, data_item_ids: &[String], cursor: u64) -> ChangeObserver {
    let (tx, rx) = mpsc::unbounded_channel();
    for id in data_item_ids {
        registry.register(id.clone(), tx.clone());
    }
    ChangeObserver::new(rx, cursor)
}
