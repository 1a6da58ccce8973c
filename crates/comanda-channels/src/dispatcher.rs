//! Outbound dispatcher — sends a payload through whatever session is open
//! right now, bounded by a timeout.
//!
//! One attempt per call. Failures are returned to the caller, who logs
//! them; the session state is never touched from here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use comanda_core::bus::Payload;

use crate::session::SessionManager;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no open session")]
    NotConnected,

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Anything that can deliver an outbound payload.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn dispatch(&self, target: &str, payload: Payload) -> Result<(), DispatchError>;
}

pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(sessions: Arc<SessionManager>, timeout: Duration) -> Self {
        Self { sessions, timeout }
    }

    /// Send with the default timeout.
    pub async fn send(&self, target: &str, payload: Payload) -> Result<(), DispatchError> {
        self.send_with_timeout(target, payload, self.timeout).await
    }

    pub async fn send_with_timeout(
        &self,
        target: &str,
        payload: Payload,
        timeout: Duration,
    ) -> Result<(), DispatchError> {
        let session = self
            .sessions
            .current_session()
            .ok_or(DispatchError::NotConnected)?;

        let kind = payload.kind();
        match tokio::time::timeout(timeout, session.handle.send(target, &payload)).await {
            Ok(Ok(())) => {
                debug!(to = %target, kind, generation = session.generation, "payload dispatched");
                Ok(())
            }
            Ok(Err(e)) => Err(DispatchError::Transport(e.to_string())),
            Err(_) => {
                warn!(to = %target, kind, timeout = ?timeout, "send timed out");
                Err(DispatchError::Timeout(timeout))
            }
        }
    }
}

#[async_trait]
impl OutboundSink for Dispatcher {
    async fn dispatch(&self, target: &str, payload: Payload) -> Result<(), DispatchError> {
        self.send(target, payload).await
    }
}
