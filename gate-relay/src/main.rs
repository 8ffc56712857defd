//! gate-relay binary entry point.
//!
//! Usage:
//! ```bash
//! gate-relay --config relay.toml
//! PORT=8080 gate-relay
//! gate-relay --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use zerok_gate_relay::cleanup::spawn_cleanup_task;
use zerok_gate_relay::http::{self, health};
use zerok_gate_relay::{Config, GateRelay};

/// Zero-knowledge pairing relay for 0k-Gate.
#[derive(Parser, Debug)]
#[command(name = "gate-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (defaults apply if it does not exist)
    #[arg(long, default_value = "relay.toml")]
    config: PathBuf,

    /// Override the port of server.bind_address
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Log filter (e.g. "info", "debug", "zerok_gate_relay=trace")
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        tracing::info!(path = %cli.config.display(), "config file not found, using defaults");
        Config::default()
    };
    if let Some(port) = cli.port {
        config.override_port(port)?;
    }
    config.validate()?;

    let addr = config.bind_addr()?;
    let cleanup = config.cleanup.clone();
    let relay = Arc::new(GateRelay::new(config));

    health::init_start_time();
    let _cleanup = spawn_cleanup_task(Arc::clone(&relay), cleanup);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "gate-relay listening");

    http::serve(listener, relay, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
    })
    .await
    .context("relay server failed")?;

    Ok(())
}
