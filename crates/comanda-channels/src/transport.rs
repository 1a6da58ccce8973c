//! Transport abstraction — one connection attempt to the chat network.
//!
//! A [`Transport`] opens a connection and hands back a [`SessionHandle`]
//! for outbound sends plus a stream of [`TransportEvent`]s. It knows nothing
//! about reconnecting; the `SessionManager` drives that.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use comanda_core::bus::{InboundMessage, Payload};

/// Status code the transport reports when the account was logged out.
pub const LOGGED_OUT: u16 = 401;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("connection is closed")]
    Closed,

    #[error("failed to send: {0}")]
    Send(String),
}

/// Why a connection ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    pub status_code: Option<u16>,
    pub message: String,
}

impl CloseReason {
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }

    /// A closure the gateway must not recover from on its own.
    pub fn is_terminal(&self) -> bool {
        self.status_code == Some(LOGGED_OUT)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (status {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Events emitted by a live connection, in the order they occurred.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    Opened,
    Closed(CloseReason),
    /// Opaque credential blob to persist.
    CredentialsUpdated(Value),
    Message(InboundMessage),
    /// The transport wants the operator to scan a pairing code.
    Qr,
}

/// Write half of a live connection.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Deliver `payload` to the address `to`.
    async fn send(&self, to: &str, payload: &Payload) -> Result<(), TransportError>;

    /// Close the connection. Idempotent.
    async fn close(&self);
}

/// Something that can open a connection to the chat network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection, authenticating with `credentials` when present.
    async fn connect(
        &self,
        credentials: Option<Value>,
    ) -> Result<(Arc<dyn SessionHandle>, mpsc::Receiver<TransportEvent>), TransportError>;

    /// Name for logging.
    fn name(&self) -> &str;
}

// ─────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────
