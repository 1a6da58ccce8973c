//! Bus event types — inbound chat messages and outbound payloads.
//!
//! An [`InboundMessage`] is the normalized form of a transport "message
//! received" event. A [`Payload`] is whatever the gateway hands back to the
//! transport for delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder text for media messages that carry no caption.
pub const MEDIA_PLACEHOLDER: &str = "Mensaje multimedia";

/// Placeholder text for shared locations.
pub const LOCATION_PLACEHOLDER: &str = "Ubicación compartida";

/// What kind of message the sender produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Media,
    Location,
    Other,
}

/// A geographic point, as received from or sent to the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// An inbound chat message from one sender.
///
/// Immutable once constructed; the coalescer only ever reads `text`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Full sender address (e.g. `573001112233@s.whatsapp.net`).
    pub sender_id: String,
    /// Normalized display text.
    pub text: String,
    /// When the message was received.
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    /// Display name reported by the transport, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Transport message id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Shared location, for `MessageKind::Location`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl InboundMessage {
    /// Create an inbound message stamped with the current time.
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>, kind: MessageKind) -> Self {
        InboundMessage {
            sender_id: sender_id.into(),
            text: text.into(),
            timestamp: Utc::now(),
            kind,
            push_name: None,
            message_id: None,
            location: None,
        }
    }

    /// Plain text message.
    pub fn text(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(sender_id, text, MessageKind::Text)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_push_name(mut self, push_name: impl Into<String>) -> Self {
        self.push_name = Some(push_name.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Phone-like identifier: the part of the sender address before `@`.
    pub fn phone(&self) -> &str {
        crate::utils::phone_from_jid(&self.sender_id)
    }
}

/// Content handed to the transport for delivery.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    Image { bytes: Vec<u8>, caption: String },
    Location(Location),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Image { .. } => "image",
            Payload::Location(_) => "location",
        }
    }
}
