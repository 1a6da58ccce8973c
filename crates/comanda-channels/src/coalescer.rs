//! Inbound coalescer — merges bursts of messages from one sender into a
//! single assistant query.
//!
//! Every message restarts the sender's quiet-period timer. When the timer
//! fires, the pending texts are detached from the queue (so new arrivals
//! start a fresh batch), joined with `\n`, sent to the assistant, and the
//! reply (or the fallback text) goes back to the sender through the
//! outbound sink.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, trace, warn};

use comanda_assistant::AssistantClient;
use comanda_core::bus::{InboundMessage, MessageBus, Payload};
use comanda_core::utils::{phone_from_jid, truncate_string};
use comanda_core::TimerRegistry;

use crate::dispatcher::OutboundSink;
use crate::formatting::markdown_to_whatsapp;

/// Messages waiting for one sender's quiet period to elapse.
struct SenderQueue {
    pending: Vec<String>,
    /// Stamp of the latest enqueue; a flush only takes the queue it was
    /// scheduled for.
    generation: u64,
}

pub struct Coalescer {
    queues: Mutex<HashMap<String, SenderQueue>>,
    timers: TimerRegistry<String>,
    next_generation: AtomicU64,
    quiet_period: Duration,
    assistant: Arc<dyn AssistantClient>,
    outbound: Arc<dyn OutboundSink>,
    fallback_reply: String,
    shutdown: Notify,
}

impl Coalescer {
    pub fn new(
        assistant: Arc<dyn AssistantClient>,
        outbound: Arc<dyn OutboundSink>,
        quiet_period: Duration,
        fallback_reply: impl Into<String>,
    ) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            timers: TimerRegistry::new(),
            next_generation: AtomicU64::new(1),
            quiet_period,
            assistant,
            outbound,
            fallback_reply: fallback_reply.into(),
            shutdown: Notify::new(),
        }
    }

    /// Buffer a message and restart its sender's quiet period.
    pub fn enqueue(self: &Arc<Self>, msg: InboundMessage) {
        let sender = msg.sender_id;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Reset the timer while still holding the queue lock so timers are
        // replaced in the same order generations are handed out.
        let mut queues = self.lock_queues();
        let queue = queues.entry(sender.clone()).or_insert_with(|| SenderQueue {
            pending: Vec::new(),
            generation,
        });
        queue.pending.push(msg.text);
        queue.generation = generation;

        debug!(
            sender = %sender,
            pending = queue.pending.len(),
            quiet_period = ?self.quiet_period,
            "message buffered"
        );

        let this = Arc::clone(self);
        let key = sender.clone();
        self.timers.reset(sender, self.quiet_period, move || async move {
            this.flush(&key, generation).await;
        });
    }

    /// Send everything buffered for `sender` to the assistant and reply.
    /// Does nothing if the queue has moved on to a newer generation.
    pub async fn flush(&self, sender: &str, generation: u64) {
        let pending = {
            let mut queues = self.lock_queues();
            match queues.get(sender) {
                Some(queue) if queue.generation == generation => {
                    queues.remove(sender).map(|q| q.pending)
                }
                _ => None,
            }
        };

        let Some(pending) = pending.filter(|p| !p.is_empty()) else {
            trace!(sender = %sender, generation, "stale flush skipped");
            return;
        };

        let combined = pending.join("\n");
        let phone = phone_from_jid(sender);
        info!(
            sender = %sender,
            messages = pending.len(),
            preview = %truncate_string(&combined, 80),
            "flushing coalesced messages"
        );

        let reply = match self.assistant.ask(phone, &combined).await {
            Ok(reply) => {
                let formatted = markdown_to_whatsapp(&reply);
                if formatted.trim().is_empty() {
                    warn!(
                        sender = %sender,
                        "assistant reply empty after formatting, using fallback"
                    );
                    self.fallback_reply.clone()
                } else {
                    formatted
                }
            }
            Err(e) => {
                warn!(
                    sender = %sender,
                    assistant = self.assistant.display_name(),
                    error = %e,
                    "assistant call failed, sending fallback reply"
                );
                self.fallback_reply.clone()
            }
        };

        if let Err(e) = self.outbound.dispatch(sender, Payload::Text(reply)).await {
            error!(sender = %sender, error = %e, "failed to deliver reply");
        }
    }

    /// Consume the inbound bus until `shutdown` is called.
    pub async fn run(self: &Arc<Self>, bus: &MessageBus) {
        info!(quiet_period = ?self.quiet_period, "coalescer started");
        loop {
            tokio::select! {
                Some(msg) = bus.consume_inbound() => self.enqueue(msg),
                _ = self.shutdown.notified() => {
                    debug!("coalescer shutdown signal received");
                    break;
                }
            }
        }
        info!("coalescer stopped");
    }

    /// Senders with buffered messages, sorted.
    pub fn pending_senders(&self) -> Vec<String> {
        let mut senders: Vec<String> = self.lock_queues().keys().cloned().collect();
        senders.sort();
        senders
    }

    /// Stop `run` and drop every pending flush.
    pub fn shutdown(&self) {
        self.timers.cancel_all();
        let dropped = {
            let mut queues = self.lock_queues();
            let count = queues.len();
            queues.clear();
            count
        };
        if dropped > 0 {
            warn!(senders = dropped, "dropping buffered messages on shutdown");
        }
        self.shutdown.notify_one();
    }

    fn lock_queues(&self) -> MutexGuard<'_, HashMap<String, SenderQueue>> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
