//! `comanda send` — open a session, deliver one text, close.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use comanda_channels::Dispatcher;
use comanda_core::bus::{MessageBus, MessageLog, Payload};
use comanda_core::config::load_config;
use comanda_core::utils::jid_from_number;

use crate::gateway::build_session_manager;

pub async fn run(to: &str, message: &str, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let jid = jid_from_number(to).context("phone number must contain digits")?;
    if message.trim().is_empty() {
        bail!("message must not be empty");
    }

    let bus = Arc::new(MessageBus::new(config.gateway.inbound_buffer));
    let log = Arc::new(MessageLog::new(config.gateway.message_log_capacity));
    let sessions = build_session_manager(&config, bus, log);

    sessions.connect();
    if !sessions
        .wait_until_open(config.session.connect_timeout())
        .await
    {
        sessions.shutdown().await;
        bail!(
            "could not open a WhatsApp session via {}",
            config.channels.whatsapp.bridge_url
        );
    }

    let dispatcher = Dispatcher::new(sessions.clone(), config.gateway.send_timeout());
    let result = dispatcher.send(&jid, Payload::text(message)).await;
    sessions.shutdown().await;
    result.context("failed to send message")?;

    println!("{} Sent to {}", "✓".green(), jid);
    Ok(())
}
