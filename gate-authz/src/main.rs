//! gate-authz binary entry point.
//!
//! Usage:
//! ```bash
//! gate-authz --config authz.toml
//! RELAY_URL=wss://relay.example.com gate-authz
//! gate-authz --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use zerok_gate_client::{RelayLink, TenantKey, WebSocketTransport};
use zerok_gate_authz::http::{self, admin};
use zerok_gate_authz::supervisor::spawn_relay_supervisor;
use zerok_gate_authz::{CheckDispatch, Config, GateAuthz};

/// Human-in-the-loop ext_authz decision service for 0k-Gate.
#[derive(Parser, Debug)]
#[command(name = "gate-authz")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (defaults apply if it does not exist)
    #[arg(long, default_value = "authz.toml")]
    config: PathBuf,

    /// Override relay.url
    #[arg(long, env = "RELAY_URL")]
    relay_url: Option<String>,

    /// Override relay.device_base_url
    #[arg(long, env = "BROWSER_BASE_URL")]
    device_base_url: Option<String>,

    /// Log filter (e.g. "info", "debug", "zerok_gate_authz=trace")
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
    if let Some(url) = cli.relay_url {
        config.relay.url = url;
    }
    if let Some(url) = cli.device_base_url {
        config.relay.device_base_url = url;
    }
    config.validate()?;

    let check_addr = config.check_addr()?;
    let admin_addr = config.admin_addr()?;
    let reconnect = config.relay.reconnect;

    // A fresh key per process; the owner re-onboards after a restart
    let key = TenantKey::generate().context("failed to generate tenant key")?;
    let link = Arc::new(RelayLink::new(&config.relay.url, key.clone(), WebSocketTransport::new()));
    if !reconnect {
        link.connect().await.context("failed to connect to relay")?;
    }

    let onboarding = key.onboarding_link(&config.relay.device_base_url);
    let dispatch = Arc::clone(&link) as Arc<dyn CheckDispatch>;
    let authz = GateAuthz::start(config, &key, dispatch);
    drop(key);

    admin::init_start_time();
    let _supervisor = spawn_relay_supervisor(Arc::clone(&link), Arc::clone(authz.correlator()), reconnect);

    tracing::info!(tenant_id = %authz.tenant_id(), page = %onboarding.page_url(), "tenant ready");
    // The full link carries the key; it goes to the operator's console, not the log
    println!("Open on your device: {}", onboarding.to_url());
    drop(onboarding);

    let check_listener = tokio::net::TcpListener::bind(check_addr)
        .await
        .with_context(|| format!("failed to bind {check_addr}"))?;
    let admin_listener = tokio::net::TcpListener::bind(admin_addr)
        .await
        .with_context(|| format!("failed to bind {admin_addr}"))?;
    tracing::info!(%check_addr, %admin_addr, version = env!("CARGO_PKG_VERSION"), "gate-authz listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
        let _ = shutdown_tx.send(true);
    });
    let shutdown = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };

    tokio::try_join!(
        http::serve_check(check_listener, Arc::clone(&authz), shutdown(shutdown_rx.clone())),
        http::serve_admin(admin_listener, Arc::clone(&authz), shutdown(shutdown_rx)),
    )
    .context("listener failed")?;

    link.close().await.context("failed to close relay link")?;
    Ok(())
}
