//! Deadlines owned by a worker. Nothing here sleeps: the owner asks for
//! [`Timers::next_deadline`] and hands the current time back in.

use std::time::{Duration, Instant};

use hashbrown::HashMap;

use crate::job::Category;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKey {
    /// Debounced drain of every queue
    Drain,
    /// The in-flight cycle of a batched category
    Cycle(Category),
    /// Waiting for the relay's `OK` on a published event
    Publish(String),
    /// A one-off download, keyed by the host's id
    Download(String),
}

/// `now + after`, or `None` when the sum is past what [`Instant`] can hold.
/// A timer that far out never fires, so callers simply don't arm it.
pub fn deadline_after(now: Instant, after: Duration) -> Option<Instant> {
    now.checked_add(after)
}

#[derive(Debug, Default)]
pub struct Timers {
    timers: HashMap<TimerKey, Instant>,
}

impl Timers {
    /// Set a timer, replacing any existing deadline for `key`
    pub fn set(&mut self, key: TimerKey, fires_at: Instant) {
        self.timers.insert(key, fires_at);
    }

    /// Set a timer unless one is already armed. Returns whether it was armed.
    pub fn arm(&mut self, key: TimerKey, fires_at: Instant) -> bool {
        if self.timers.contains_key(&key) {
            return false;
        }
        self.timers.insert(key, fires_at);
        true
    }

    /// [`Timers::set`] `after` from `now`. An unrepresentable deadline
    /// leaves no timer for `key`.
    pub fn set_after(&mut self, key: TimerKey, now: Instant, after: Duration) -> Option<Instant> {
        let fires_at = deadline_after(now, after);
        match fires_at {
            Some(fires_at) => self.set(key, fires_at),
            None => {
                self.timers.remove(&key);
            }
        }
        fires_at
    }

    /// [`Timers::arm`] `after` from `now`
    pub fn arm_after(&mut self, key: TimerKey, now: Instant, after: Duration) -> bool {
        deadline_after(now, after).is_some_and(|fires_at| self.arm(key, fires_at))
    }

    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        self.timers.remove(key).is_some()
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.timers.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Remove and return the earliest timer due at `now`, if any. Ties are
    /// broken by key so firing order is deterministic.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerKey> {
        let key = self
            .timers
            .iter()
            .filter(|(_, fires_at)| **fires_at <= now)
            .min_by(|(ka, a), (kb, b)| a.cmp(b).then_with(|| ka.cmp(kb)))
            .map(|(key, _)| key.clone())?;

        self.timers.remove(&key);
        Some(key)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
