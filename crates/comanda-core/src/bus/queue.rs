//! Inbound message queue between the transport session and the coalescer.
//!
//! Uses a bounded tokio::sync::mpsc channel.

use super::types::InboundMessage;
use tokio::sync::mpsc;

/// The inbound bus.
///
/// - The session manager publishes normalized `InboundMessage`s
/// - The coalescer task consumes them and buffers per sender
pub struct MessageBus {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<InboundMessage>>,
}

impl MessageBus {
    /// Create a new message bus with the given buffer capacity.
    pub fn new(buffer_size: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer_size);

        MessageBus {
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        }
    }

    /// Publish a message received from the transport.
    pub async fn publish_inbound(
        &self,
        msg: InboundMessage,
    ) -> Result<(), mpsc::error::SendError<InboundMessage>> {
        self.inbound_tx.send(msg).await
    }

    /// Consume the next inbound message, waiting until one is available.
    ///
    /// The bus keeps its own sender, so this never observes a closed queue.
    pub async fn consume_inbound(&self) -> Option<InboundMessage> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await
    }
}
