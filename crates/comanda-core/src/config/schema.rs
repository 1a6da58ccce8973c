//! Configuration schema.
//!
//! Hierarchy: `Config` → `AssistantConfig`, `GatewayConfig`, `SessionConfig`,
//! `ChannelsConfig`, `AdminConfig`, `RestaurantConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::bus::types::Location;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.comanda/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub gateway: GatewayConfig,
    pub session: SessionConfig,
    pub channels: ChannelsConfig,
    pub admin: AdminConfig,
    pub restaurant: RestaurantConfig,
}

// ─────────────────────────────────────────────
// Assistant
// ─────────────────────────────────────────────

/// Downstream assistant API settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistantConfig {
    /// Base URL; requests go to `{apiBase}/chat`.
    pub api_base: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl AssistantConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api/v1/chatbot".to_string(),
            timeout_ms: 60_000,
            extra_headers: None,
        }
    }
}

// ─────────────────────────────────────────────
// Gateway (coalescing + outbound)
// ─────────────────────────────────────────────

/// Reply sent when the assistant cannot answer.
pub const DEFAULT_FALLBACK_REPLY: &str =
    "Estamos experimentando problemas, por favor intente más tarde";

/// Message coalescing and reply delivery settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// Quiet period after the last message before a sender's burst is flushed.
    pub quiet_period_ms: u64,
    /// Timeout for a single outbound send.
    pub send_timeout_ms: u64,
    /// Reply used when the assistant call fails.
    pub fallback_reply: String,
    /// Capacity of the inbound queue.
    pub inbound_buffer: usize,
    /// Number of received messages kept for `/api/messages`.
    pub message_log_capacity: usize,
}

impl GatewayConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: 5_000,
            send_timeout_ms: 25_000,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            inbound_buffer: 100,
            message_log_capacity: 500,
        }
    }
}

// ─────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────

/// Transport session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Upper bound on a single connection attempt.
    pub connect_timeout_ms: u64,
    /// Directory holding the transport credentials.
    pub auth_dir: String,
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 60_000,
            auth_dir: "~/.comanda/auth".to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// How the session waits between connection attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectMode {
    /// Capped exponential backoff.
    Backoff,
    /// Reconnect right away, only waiting `minDelayMs`.
    Immediate,
}

/// Reconnect policy settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectConfig {
    pub mode: ReconnectMode,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Floor applied to every delay, whatever the mode.
    pub min_delay_ms: u64,
    /// Consecutive failed attempts before giving up (0 = never).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            mode: ReconnectMode::Backoff,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            min_delay_ms: 250,
            max_attempts: 0,
        }
    }
}

// ─────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────

/// Chat transport configurations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
}

/// WhatsApp bridge config.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WhatsAppConfig {
    pub bridge_url: String,
    /// Phone numbers allowed to talk to the gateway. Empty = everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            bridge_url: "ws://localhost:3001".to_string(),
            allowed_users: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────
// Admin HTTP
// ─────────────────────────────────────────────

/// Administrative HTTP surface (status, raw sends, message log).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 3002,
        }
    }
}

// ─────────────────────────────────────────────
// Restaurant
// ─────────────────────────────────────────────

/// Restaurant details shared with customers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestaurantConfig {
    /// Location sent by `/api/send-location`.
    pub location: Location,
}

impl Default for RestaurantConfig {
    fn default() -> Self {
        Self {
            location: Location {
                latitude: 5.03829,
                longitude: -75.44636,
                name: Some("Restaurante Juanchito Plaza".to_string()),
                address: Some("Km 13 Via Magdalena, Manizales, Caldas".to_string()),
            },
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
