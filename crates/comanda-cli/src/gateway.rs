//! Gateway command — wires the bridge session, coalescer, and admin API.
//!
//! Startup sequence:
//! 1. Load config
//! 2. Create inbound bus + message log
//! 3. Create session manager (bridge transport + credential store)
//! 4. Create dispatcher, assistant client, coalescer
//! 5. Connect, then `tokio::select!` of coalescer + admin API + Ctrl+C
//! 6. Graceful shutdown: cancel pending flushes, close the session

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use comanda_assistant::HttpAssistant;
use comanda_channels::{
    BridgeTransport, Coalescer, Dispatcher, FileCredentialStore, SessionManager,
};
use comanda_core::bus::{MessageBus, MessageLog};
use comanda_core::config::{load_config, Config};

use crate::admin::{self, AdminState};
use crate::helpers;

/// Build the session manager for the configured bridge.
pub fn build_session_manager(
    config: &Config,
    bus: Arc<MessageBus>,
    log: Arc<MessageLog>,
) -> Arc<SessionManager> {
    let whatsapp = &config.channels.whatsapp;
    let transport =
        BridgeTransport::new(whatsapp.bridge_url.clone(), whatsapp.allowed_users.clone());
    let auth_dir = helpers::expand_tilde(&config.session.auth_dir);
    let store = FileCredentialStore::new(&auth_dir);
    debug!(path = %store.path().display(), "using credential store");

    let sessions = Arc::new(SessionManager::new(
        Arc::new(transport),
        Arc::new(store),
        bus,
        log,
        &config.session,
    ));
    sessions.on_credentials_changed(|_| debug!("whatsapp credentials updated"));
    sessions
}

/// Run the gateway until Ctrl+C.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    helpers::print_banner();
    println!("  Mode: Gateway");
    println!();

    // 1. Load config
    let config = load_config(config_path);
    let gw = &config.gateway;

    // 2. Bus + log
    let bus = Arc::new(MessageBus::new(gw.inbound_buffer));
    let log = Arc::new(MessageLog::new(gw.message_log_capacity));

    // 3. Session
    let sessions = build_session_manager(&config, bus.clone(), log.clone());

    // 4. Outbound + assistant + coalescer
    let dispatcher = Arc::new(Dispatcher::new(sessions.clone(), gw.send_timeout()));
    let assistant =
        HttpAssistant::new(&config.assistant).context("failed to create assistant client")?;
    let coalescer = Arc::new(Coalescer::new(
        Arc::new(assistant),
        dispatcher.clone(),
        gw.quiet_period(),
        gw.fallback_reply.clone(),
    ));

    let admin_state = Arc::new(AdminState {
        sessions: sessions.clone(),
        dispatcher,
        log,
        restaurant_location: config.restaurant.location.clone(),
    });

    info!(
        bridge = %config.channels.whatsapp.bridge_url,
        assistant = %config.assistant.api_base,
        quiet_period = ?gw.quiet_period(),
        "gateway starting"
    );

    println!("  Bridge:    {}", config.channels.whatsapp.bridge_url);
    println!("  Assistant: {}", config.assistant.api_base);
    println!("  Quiet:     {} ms", gw.quiet_period_ms);
    if config.admin.enabled {
        println!("  Admin API: http://{}:{}", config.admin.host, config.admin.port);
    } else {
        println!("  Admin API: disabled");
    }
    println!();
    println!("  Ctrl+C to stop");
    println!();

    // 5. Connect and run
    sessions.connect();

    let admin_server = async {
        if config.admin.enabled {
            admin::serve(&config.admin, admin_state).await
        } else {
            std::future::pending::<Result<()>>().await
        }
    };

    tokio::select! {
        _ = coalescer.run(&bus) => {
            info!("coalescer exited");
        }
        result = admin_server => {
            if let Err(e) = result {
                error!(error = %e, "admin API error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("  Shutting down...");
            info!("received Ctrl+C, shutting down");
        }
    }

    // 6. Shutdown
    coalescer.shutdown();
    sessions.shutdown().await;

    println!("  Gateway stopped. Goodbye!");
    Ok(())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
