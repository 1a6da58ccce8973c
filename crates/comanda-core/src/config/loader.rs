//! Config loader — reads `~/.comanda/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.comanda/config.json` (or an explicit path)
//! 3. Environment variables `COMANDA_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{Config, ReconnectMode};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the given or default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `COMANDA_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `COMANDA_ASSISTANT__API_BASE` → `assistant.api_base`
/// - `COMANDA_ASSISTANT__TIMEOUT_MS` → `assistant.timeout_ms`
/// - `COMANDA_GATEWAY__QUIET_PERIOD_MS` → `gateway.quiet_period_ms`
/// - `COMANDA_GATEWAY__SEND_TIMEOUT_MS` → `gateway.send_timeout_ms`
/// - `COMANDA_GATEWAY__FALLBACK_REPLY` → `gateway.fallback_reply`
/// - `COMANDA_CHANNELS__WHATSAPP__BRIDGE_URL` → `channels.whatsapp.bridge_url`
/// - `COMANDA_ADMIN__HOST` / `COMANDA_ADMIN__PORT` → `admin.host` / `admin.port`
/// - `COMANDA_SESSION__RECONNECT__MODE` → `session.reconnect.mode` (`backoff` | `immediate`)
fn apply_env_overrides(mut config: Config) -> Config {
    // Assistant
    if let Ok(val) = std::env::var("COMANDA_ASSISTANT__API_BASE") {
        config.assistant.api_base = val;
    }
    if let Some(ms) = env_u64("COMANDA_ASSISTANT__TIMEOUT_MS") {
        config.assistant.timeout_ms = ms;
    }

    // Gateway
    if let Some(ms) = env_u64("COMANDA_GATEWAY__QUIET_PERIOD_MS") {
        config.gateway.quiet_period_ms = ms;
    }
    if let Some(ms) = env_u64("COMANDA_GATEWAY__SEND_TIMEOUT_MS") {
        config.gateway.send_timeout_ms = ms;
    }
    if let Ok(val) = std::env::var("COMANDA_GATEWAY__FALLBACK_REPLY") {
        config.gateway.fallback_reply = val;
    }

    // Channels
    if let Ok(val) = std::env::var("COMANDA_CHANNELS__WHATSAPP__BRIDGE_URL") {
        config.channels.whatsapp.bridge_url = val;
    }

    // Admin
    if let Ok(val) = std::env::var("COMANDA_ADMIN__HOST") {
        config.admin.host = val;
    }
    if let Ok(val) = std::env::var("COMANDA_ADMIN__PORT") {
        if let Ok(p) = val.parse::<u16>() {
            config.admin.port = p;
        }
    }

    // Session
    if let Ok(val) = std::env::var("COMANDA_SESSION__RECONNECT__MODE") {
        match val.to_ascii_lowercase().as_str() {
            "backoff" => config.session.reconnect.mode = ReconnectMode::Backoff,
            "immediate" => config.session.reconnect.mode = ReconnectMode::Immediate,
            other => warn!("Ignoring unknown reconnect mode '{}'", other),
        }
    }

    config
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
