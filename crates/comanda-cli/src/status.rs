//! `comanda status` — show configuration and whether a gateway is running.
//!
//! - Shows config path, bridge, assistant, timings
//! - Shows whether stored WhatsApp credentials exist
//! - Asks a running gateway's admin API for the session state

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use comanda_core::config::{get_config_path, load_config};

/// Run the status command.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(get_config_path);

    println!();
    println!("{}", "🍔 Comanda Status".cyan().bold());
    println!();

    // Config
    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".yellow().to_string()
        }
    );

    // Credentials
    let creds = crate::helpers::expand_tilde(&config.session.auth_dir).join("creds.json");
    println!(
        "  {:<18} {} {}",
        "Credentials:".bold(),
        creds.display(),
        if creds.exists() {
            "✓".green().to_string()
        } else {
            "(not linked yet)".red().to_string()
        }
    );

    println!(
        "  {:<18} {}",
        "Bridge:".bold(),
        config.channels.whatsapp.bridge_url
    );
    println!("  {:<18} {}", "Assistant:".bold(), config.assistant.api_base);
    println!(
        "  {:<18} {} | send timeout: {} | reconnect: {:?}",
        "Timing:".bold(),
        format!("quiet: {} ms", config.gateway.quiet_period_ms).dimmed(),
        format!("{} ms", config.gateway.send_timeout_ms).dimmed(),
        config.session.reconnect.mode,
    );

    let allowed = &config.channels.whatsapp.allowed_users;
    let allowed = if allowed.is_empty() {
        "everyone".dimmed().to_string()
    } else {
        allowed.join(", ")
    };
    println!("  {:<18} {}", "Allowed users:".bold(), allowed);

    // Gateway
    println!();
    if !config.admin.enabled {
        println!("  {:<18} {}", "Gateway:".bold(), "admin API disabled".dimmed());
        println!();
        return Ok(());
    }

    let host = match config.admin.host.as_str() {
        "0.0.0.0" | "" => "127.0.0.1",
        other => other,
    };
    let url = format!("http://{}:{}/api/status", host, config.admin.port);
    let gateway = match probe(&url).await {
        Some(body) if body["connected"].as_bool() == Some(true) => {
            format!("{} (WhatsApp connected)", "✓ running".green())
        }
        Some(body) => format!(
            "{} (WhatsApp {})",
            "✓ running".green(),
            body["state"].as_str().unwrap_or("disconnected").yellow()
        ),
        None => format!("{}", "· not running".dimmed()),
    };
    println!("  {:<18} {}", "Gateway:".bold(), gateway);
    println!();

    Ok(())
}

async fn probe(url: &str) -> Option<Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .ok()?;
    let response = client.get(url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.json().await.ok()
}
