//! # Relay Node
//!
//! Hosts the streaming gateway for the in-process producer buses.
//!
//! ## Startup
//!
//! 1. Logging (`RUST_LOG`, default `info`)
//! 2. Configuration: `RELAY_CONFIG` TOML file, then environment overrides
//! 3. One bus per payload type, sized by `bus.subscriber_capacity`
//! 4. Listener bind, then serve until Ctrl+C
//!
//! ## Shutdown
//!
//! Ctrl+C fires the gateway's root cancel token, live sessions unwind, the
//! server waits up to `server.shutdown_grace` for them, and finally every
//! bus is closed exactly once.

use anyhow::{Context, Result};
use std::sync::Arc;
use stream_gateway::{EventBuses, GatewayConfig, GatewayService};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Load configuration from file and environment.
fn load_config() -> Result<GatewayConfig> {
    let mut config = match std::env::var("RELAY_CONFIG") {
        Ok(path) => {
            info!(%path, "Loading configuration file");
            GatewayConfig::from_file(&path).with_context(|| format!("Failed to load {path}"))?
        }
        Err(_) => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Apply `RELAY_*` overrides. Unparseable values are ignored with a warning.
fn apply_env_overrides(config: &mut GatewayConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("RELAY_HOST") {
        match host.parse() {
            Ok(h) => config.server.host = h,
            Err(_) => warn!(%host, "RELAY_HOST is not an IP address, ignoring"),
        }
    }
    if let Some(port) = var("RELAY_PORT") {
        match port.parse() {
            Ok(p) => config.server.port = p,
            Err(_) => warn!(%port, "RELAY_PORT is not a port number, ignoring"),
        }
    }
    if let Some(token) = var("RELAY_AUTH_TOKEN") {
        config.auth.token = Some(token);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = load_config()?;
    let buses = EventBuses::with_capacity(config.bus.subscriber_capacity);

    let service = Arc::new(
        GatewayService::with_config_token(config, buses.clone())
            .context("Failed to build gateway")?,
    );
    let listener = service.bind().await.context("Failed to bind listener")?;

    let server = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.serve(listener).await })
    };

    info!("Relay node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    // Graceful shutdown
    info!("Received shutdown signal");
    service.shutdown();
    server
        .await
        .context("Server task panicked")?
        .context("Server stopped with an error")?;

    buses.close_all();
    info!("Relay node stopped");
    Ok(())
}
