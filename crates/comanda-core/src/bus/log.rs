//! Bounded in-memory log of received messages, read by the admin API.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::types::InboundMessage;

/// Default number of messages kept.
pub const DEFAULT_LOG_CAPACITY: usize = 500;

/// Ring buffer of the most recent inbound messages. Oldest entries are
/// evicted first.
pub struct MessageLog {
    capacity: usize,
    entries: Mutex<VecDeque<InboundMessage>>,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn record(&self, msg: InboundMessage) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(msg);
    }

    /// Snapshot, oldest first.
    pub fn snapshot(&self) -> Vec<InboundMessage> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
