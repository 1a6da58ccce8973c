//! Comanda CLI — entry point.
//!
//! # Commands
//!
//! - `comanda gateway [--logs] [--json-logs] [--config PATH]` — run the gateway
//! - `comanda status` — show configuration and gateway status
//! - `comanda send --to NUMBER --message TEXT` — one-off text message

mod admin;
mod gateway;
mod helpers;
mod send;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// 🍔 Comanda — WhatsApp ordering gateway
#[derive(Parser)]
#[command(name = "comanda", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway (WhatsApp session, coalescer, admin API)
    Gateway {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,

        /// Emit logs as JSON lines
        #[arg(long, default_value_t = false)]
        json_logs: bool,

        /// Config file (default: ~/.comanda/config.json)
        #[arg(short, long, env = "COMANDA_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Show configuration and gateway status
    Status {
        /// Config file (default: ~/.comanda/config.json)
        #[arg(short, long, env = "COMANDA_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Send a single text message and exit
    Send {
        /// Recipient phone number (digits, any formatting)
        #[arg(long)]
        to: String,

        /// Message text
        #[arg(short, long)]
        message: String,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,

        /// Config file (default: ~/.comanda/config.json)
        #[arg(short, long, env = "COMANDA_CONFIG")]
        config: Option<PathBuf>,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Gateway {
            logs,
            json_logs,
            config,
        } => {
            init_logging(logs, json_logs);
            gateway::run(config.as_deref()).await
        }
        Commands::Status { config } => status::run(config.as_deref()).await,
        Commands::Send {
            to,
            message,
            logs,
            config,
        } => {
            init_logging(logs, false);
            send::run(&to, &message, config.as_deref()).await
        }
    }
}

/// Initialize tracing/logging. `RUST_LOG` wins over the flags.
fn init_logging(verbose: bool, json: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "comanda=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
