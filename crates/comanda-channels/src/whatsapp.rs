//! WhatsApp transport — WebSocket client for a Baileys-based Node.js bridge.
//!
//! Architecture:
//! - A Node.js bridge process (`@whiskeysockets/baileys`) speaks WhatsApp Web protocol
//! - We connect as a WebSocket **client** to the bridge (default `ws://localhost:3001`)
//! - Inbound: bridge pushes `{"type":"status"|"creds"|"message"|"qr"|"error", ...}` JSON
//! - Outbound: `{"type":"auth","creds":{..}}` once after connecting, then
//!   `{"type":"send","to":"...", "text"|"image"+"caption"|"location": ...}`
//!
//! Each `connect` is a single connection; reconnecting is the session
//! manager's job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use comanda_core::bus::types::{LOCATION_PLACEHOLDER, MEDIA_PLACEHOLDER};
use comanda_core::bus::{InboundMessage, Location, MessageKind, Payload};
use comanda_core::utils::phone_from_jid;

use crate::transport::{CloseReason, SessionHandle, Transport, TransportError, TransportEvent};

// ─────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────

/// Default bridge WebSocket URL.
const DEFAULT_BRIDGE_URL: &str = "ws://localhost:3001";

/// Events buffered between the socket reader and the session driver.
const EVENT_BUFFER: usize = 64;

const MEDIA_TYPES: &[&str] = &[
    "imageMessage",
    "videoMessage",
    "audioMessage",
    "documentMessage",
    "stickerMessage",
];

const TEXT_TYPES: &[&str] = &["", "conversation", "extendedTextMessage"];

const LOCATION_TYPES: &[&str] = &["locationMessage", "liveLocationMessage"];

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Type alias for the WebSocket sink.
type WsSender = futures_util::stream::SplitSink<WsStream, WsMessage>;

type WsReader = futures_util::stream::SplitStream<WsStream>;

// ─────────────────────────────────────────────
// Frame decoding
// ─────────────────────────────────────────────

/// Turns bridge JSON frames into transport events.
#[derive(Clone, Debug, Default)]
pub struct FrameDecoder {
    /// Allow-list of phone numbers (the part before `@`). Empty = allow everyone.
    allowed_users: Vec<String>,
}

impl FrameDecoder {
    pub fn new(allowed_users: Vec<String>) -> Self {
        Self { allowed_users }
    }

    /// Check if a sender is allowed.
    fn is_allowed(&self, phone: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == phone)
    }

    /// Parse one frame. `Ok(None)` means the frame carries nothing the
    /// session cares about.
    pub fn decode(&self, raw: &str) -> anyhow::Result<Option<TransportEvent>> {
        let payload: Value = serde_json::from_str(raw)?;
        let frame_type = payload["type"].as_str().unwrap_or("");

        let event = match frame_type {
            "status" => decode_status(&payload),
            "creds" => match payload.get("creds") {
                Some(creds) if !creds.is_null() => {
                    Some(TransportEvent::CredentialsUpdated(creds.clone()))
                }
                _ => {
                    debug!("whatsapp bridge: creds frame without creds");
                    None
                }
            },
            "message" => self.normalize_message(&payload).map(TransportEvent::Message),
            "qr" => Some(TransportEvent::Qr),
            "sent" => {
                let to = payload["to"].as_str().unwrap_or("?");
                debug!(to = to, "whatsapp message sent confirmation");
                None
            }
            "error" => {
                let err = payload["error"].as_str().unwrap_or("unknown");
                error!(error = err, "whatsapp bridge error");
                None
            }
            other => {
                debug!(frame_type = other, "whatsapp bridge: unknown frame type");
                None
            }
        };

        Ok(event)
    }

    /// Normalize a `"message"` frame. Messages sent by ourselves, without a
    /// sender, without a body, or from senders outside the allow-list are
    /// dropped.
    fn normalize_message(&self, payload: &Value) -> Option<InboundMessage> {
        if payload["fromMe"].as_bool().unwrap_or(false) {
            debug!("whatsapp: ignoring own message");
            return None;
        }

        let sender = payload["sender"].as_str().unwrap_or("").trim();
        if sender.is_empty() {
            debug!("whatsapp message with no sender, ignoring");
            return None;
        }

        let phone = phone_from_jid(sender);
        if !self.is_allowed(phone) {
            warn!(sender = %phone, "whatsapp message from unauthorized user, ignoring");
            return None;
        }

        let content = payload["content"].as_str().unwrap_or("").trim();
        let message_type = payload["messageType"].as_str().unwrap_or("");
        let location = payload
            .get("location")
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value::<Location>(v.clone()).ok());

        let (kind, text) = if location.is_some() || LOCATION_TYPES.contains(&message_type) {
            if let Some(ref loc) = location {
                info!(
                    sender = %phone,
                    latitude = loc.latitude,
                    longitude = loc.longitude,
                    "whatsapp location received"
                );
            }
            (MessageKind::Location, LOCATION_PLACEHOLDER.to_string())
        } else if TEXT_TYPES.contains(&message_type) {
            if content.is_empty() {
                debug!(sender = %phone, "whatsapp message without body, ignoring");
                return None;
            }
            (MessageKind::Text, content.to_string())
        } else {
            let kind = if MEDIA_TYPES.contains(&message_type) {
                MessageKind::Media
            } else {
                MessageKind::Other
            };
            let text = if content.is_empty() {
                MEDIA_PLACEHOLDER.to_string()
            } else {
                content.to_string()
            };
            (kind, text)
        };

        debug!(
            sender = %phone,
            kind = ?kind,
            content_len = text.len(),
            "whatsapp inbound message"
        );

        let mut inbound = InboundMessage::new(sender, text, kind);
        if let Some(ts) = payload["timestamp"]
            .as_i64()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
        {
            inbound = inbound.with_timestamp(ts);
        }
        if let Some(name) = payload["pushName"].as_str().filter(|s| !s.is_empty()) {
            inbound = inbound.with_push_name(name);
        }
        if let Some(id) = payload["id"].as_str() {
            inbound = inbound.with_message_id(id);
        }
        if let Some(loc) = location {
            inbound = inbound.with_location(loc);
        }

        Some(inbound)
    }
}

fn decode_status(payload: &Value) -> Option<TransportEvent> {
    let status = payload["status"].as_str().unwrap_or("unknown");
    match status {
        "open" | "connected" => Some(TransportEvent::Opened),
        "close" | "closed" | "disconnected" => {
            let reason = &payload["reason"];
            let status_code = reason["statusCode"]
                .as_u64()
                .and_then(|code| u16::try_from(code).ok());
            let message = reason["message"].as_str().unwrap_or(status);
            Some(TransportEvent::Closed(CloseReason::new(status_code, message)))
        }
        other => {
            debug!(status = other, "whatsapp bridge status update");
            None
        }
    }
}

/// Build the `send` frame for a payload.
pub fn encode_send(to: &str, payload: &Payload) -> Value {
    match payload {
        Payload::Text(text) => json!({ "type": "send", "to": to, "text": text }),
        Payload::Image { bytes, caption } => json!({
            "type": "send",
            "to": to,
            "image": hex::encode(bytes),
            "caption": caption,
        }),
        Payload::Location(location) => json!({ "type": "send", "to": to, "location": location }),
    }
}

// ─────────────────────────────────────────────
// BridgeTransport
// ─────────────────────────────────────────────

/// WhatsApp transport — connects to a Baileys bridge via WebSocket.
pub struct BridgeTransport {
    /// Bridge WebSocket URL.
    bridge_url: String,
    decoder: FrameDecoder,
}

impl BridgeTransport {
    pub fn new(bridge_url: String, allowed_users: Vec<String>) -> Self {
        let url = if bridge_url.is_empty() {
            DEFAULT_BRIDGE_URL.to_string()
        } else {
            bridge_url
        };

        Self {
            bridge_url: url,
            decoder: FrameDecoder::new(allowed_users),
        }
    }

    pub fn bridge_url(&self) -> &str {
        &self.bridge_url
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn connect(
        &self,
        credentials: Option<Value>,
    ) -> Result<(Arc<dyn SessionHandle>, mpsc::Receiver<TransportEvent>), TransportError> {
        debug!(url = %self.bridge_url, "connecting to whatsapp bridge");
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.bridge_url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!(url = %self.bridge_url, "connected to whatsapp bridge");

        let (mut write, read) = ws_stream.split();

        if let Some(creds) = credentials {
            let frame = json!({ "type": "auth", "creds": creds }).to_string();
            write
                .send(WsMessage::text(frame))
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            debug!("sent stored credentials to whatsapp bridge");
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let reader = tokio::spawn(read_loop(read, self.decoder.clone(), tx));

        let handle = BridgeHandle {
            write: Mutex::new(Some(write)),
            reader: std::sync::Mutex::new(Some(reader)),
        };

        Ok((Arc::new(handle), rx))
    }

    fn name(&self) -> &str {
        "whatsapp"
    }
}

/// Pump frames off the socket until it closes. Always ends with a
/// `Closed` event unless the receiver went away first.
async fn read_loop(
    mut read: WsReader,
    decoder: FrameDecoder,
    events: mpsc::Sender<TransportEvent>,
) {
    let reason = loop {
        let msg = match read.next().await {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                warn!(error = %e, "whatsapp ws read error");
                break CloseReason::new(None, format!("websocket error: {e}"));
            }
            None => {
                debug!("whatsapp ws stream ended");
                break CloseReason::new(None, "bridge stream ended");
            }
        };

        let text = match msg {
            WsMessage::Text(t) => t.to_string(),
            WsMessage::Close(frame) => {
                info!("whatsapp bridge closed connection");
                let message = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty())
                    .unwrap_or_else(|| "bridge closed connection".to_string());
                break CloseReason::new(None, message);
            }
            _ => continue,
        };

        match decoder.decode(&text) {
            Ok(Some(event)) => {
                let closing = matches!(event, TransportEvent::Closed(_));
                if events.send(event).await.is_err() || closing {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => debug!(error = %e, "dropping malformed bridge frame"),
        }
    };

    let _ = events.send(TransportEvent::Closed(reason)).await;
}

/// Write half of a bridge connection.
struct BridgeHandle {
    write: Mutex<Option<WsSender>>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl SessionHandle for BridgeHandle {
    async fn send(&self, to: &str, payload: &Payload) -> Result<(), TransportError> {
        let frame = encode_send(to, payload).to_string();

        let mut guard = self.write.lock().await;
        let write = guard.as_mut().ok_or(TransportError::Closed)?;
        write
            .send(WsMessage::text(frame))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;

        debug!(to = %to, kind = payload.kind(), "whatsapp message sent");
        Ok(())
    }

    async fn close(&self) {
        if let Some(mut write) = self.write.lock().await.take() {
            let _ = write.send(WsMessage::Close(None)).await;
        }
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        let reader = self.reader.get_mut().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
