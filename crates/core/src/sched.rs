//! Cooperative timer wheel for the single-threaded daemon loop.
//!
//! The routing daemon runs everything from one event loop; timers are just
//! entries the loop polls between I/O events. A pending task is identified
//! by its key, so a timer can be cancelled before it fires (for example on
//! reconfiguration) and re-scheduling an already-pending key replaces the
//! old deadline instead of duplicating it.

use std::fmt::Debug;

/// Deadline-ordered task registry.
///
/// `K` identifies a scheduled task (callback + argument in the original
/// daemon's terms). At most one entry per key is pending at a time.
#[derive(Debug, Default)]
pub struct Scheduler<K: Eq + Copy + Debug> {
    // Small and scanned linearly; the daemon schedules a handful of timers.
    pending: Vec<(u64, K)>,
}

impl<K: Eq + Copy + Debug> Scheduler<K> {
    pub fn new() -> Self {
        Scheduler {
            pending: Vec::new(),
        }
    }

    /// Schedules `key` to fire at `at_ms`. If the key is already pending,
    /// its deadline is replaced.
    pub fn schedule(&mut self, at_ms: u64, key: K) {
        self.cancel(key);
        tracing::trace!(?key, at_ms, "timer scheduled");
        self.pending.push((at_ms, key));
    }

    /// Removes a pending task. Returns whether anything was cancelled;
    /// cancelling an absent key is a no-op.
    pub fn cancel(&mut self, key: K) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(_, k)| *k != key);
        before != self.pending.len()
    }

    /// Whether a task for `key` is currently pending.
    pub fn is_pending(&self, key: K) -> bool {
        self.pending.iter().any(|(_, k)| *k == key)
    }

    /// Deadline of a pending task, if any.
    pub fn deadline(&self, key: K) -> Option<u64> {
        self.pending
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(at, _)| *at)
    }

    /// Drains every task whose deadline has passed, in deadline order.
    pub fn due(&mut self, now_ms: u64) -> Vec<K> {
        let mut fired: Vec<(u64, K)> = Vec::new();
        self.pending.retain(|(at, k)| {
            if *at <= now_ms {
                fired.push((*at, *k));
                false
            } else {
                true
            }
        });
        fired.sort_by_key(|(at, _)| *at);
        fired.into_iter().map(|(_, k)| k).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
