//! Timer registry — keyed, cancellable, reschedulable delayed callbacks.
//!
//! `reset(key, delay, callback)` replaces whatever was scheduled for `key`.
//! Every scheduled entry carries a unique id; when its sleep elapses the task
//! re-checks, under the registry lock, that its id is still the one stored
//! for the key and removes the entry before running the callback. A newer
//! `reset` (or a `cancel`) swaps or removes the entry, so a stale task that
//! woke up concurrently finds a different id and returns without firing.
//!
//! Once a callback has claimed its entry it runs to completion; later
//! `reset`s for the same key schedule a fresh entry and never abort it.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

struct TimerEntry {
    id: u64,
    task: JoinHandle<()>,
}

type Entries<K> = Arc<Mutex<HashMap<K, TimerEntry>>>;

/// Keyed delayed-callback registry. Requires a Tokio runtime.
pub struct TimerRegistry<K> {
    entries: Entries<K>,
    next_id: AtomicU64,
}

impl<K> TimerRegistry<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Schedule `callback` to run after `delay`, replacing any callback
    /// previously scheduled for `key`.
    pub fn reset<F, Fut>(&self, key: K, delay: Duration, callback: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entries = Arc::clone(&self.entries);
        let task_key = key.clone();

        // Hold the lock across spawn + insert so a zero-delay task cannot
        // look for its entry before it exists.
        let mut guard = lock(&self.entries);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if claim(&entries, &task_key, id) {
                callback().await;
            }
        });

        if let Some(previous) = guard.insert(key, TimerEntry { id, task }) {
            trace!(previous = previous.id, current = id, "timer rescheduled");
            previous.task.abort();
        }
    }

    /// Cancel the callback scheduled for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.entries).remove(key) {
            Some(entry) => {
                entry.task.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel everything.
    pub fn cancel_all(&self) {
        for (_, entry) in lock(&self.entries).drain() {
            entry.task.abort();
        }
    }

    /// Whether a callback is scheduled (and has not yet started) for `key`.
    pub fn is_scheduled(&self, key: &K) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for TimerRegistry<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for TimerRegistry<K> {
    fn drop(&mut self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in entries.drain() {
            entry.task.abort();
        }
    }
}

fn lock<K>(entries: &Entries<K>) -> MutexGuard<'_, HashMap<K, TimerEntry>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

/// Remove the entry for `key` if it is still the one with `id`.
fn claim<K: Eq + Hash>(entries: &Entries<K>, key: &K, id: u64) -> bool {
    let mut guard = lock(entries);
    match guard.get(key) {
        Some(entry) if entry.id == id => {
            guard.remove(key);
            true
        }
        _ => false,
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
