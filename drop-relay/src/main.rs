//! codedrop-relay binary entry point.
//!
//! Usage:
//! ```bash
//! codedrop-relay --config relay.toml
//! codedrop-relay --help
//! ```

use anyhow::Context;
use clap::Parser;
use codedrop_relay::cleanup::spawn_cleanup_task;
use codedrop_relay::http::build_router;
use codedrop_relay::{Config, DropRelay};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ephemeral code-keyed transfer relay.
#[derive(Debug, Parser)]
#[command(name = "codedrop-relay", version, about)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply if it is absent.
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        tracing::warn!("Config file {} not found, using defaults", cli.config.display());
        Config::default()
    };

    let bind: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind_address))?;
    let cleanup = config.cleanup.clone();

    let relay = Arc::new(DropRelay::from_config(config).await?);
    let sweeper = spawn_cleanup_task(Arc::clone(&relay), cleanup);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!("codedrop-relay v{} listening on {}", env!("CARGO_PKG_VERSION"), bind);

    axum::serve(
        listener,
        build_router(relay).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    sweeper.abort();
    tracing::info!("codedrop-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
