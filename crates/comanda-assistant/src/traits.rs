//! Assistant client trait — the seam between the coalescer and the
//! conversational backend.

use std::time::Duration;

use async_trait::async_trait;

/// Why an `ask` produced no reply.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("assistant request timed out after {0:?}")]
    Timeout(Duration),

    #[error("assistant returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("assistant request failed: {0}")]
    Transport(String),

    #[error("failed to decode assistant reply: {0}")]
    Decode(String),

    #[error("assistant reply had no content")]
    EmptyReply,
}

/// A request/response conversational backend.
///
/// Implementations make exactly one call per `ask`, never retry, and bound
/// the call with their own timeout. Callers own any fallback behaviour.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    /// Ask the assistant on behalf of `identifier` (a phone number).
    async fn ask(&self, identifier: &str, text: &str) -> Result<String, AssistantError>;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
