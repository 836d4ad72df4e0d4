//! studio-relay - Upload relay backend
//!
//! Accepts chunked and whole-file uploads from studio clients and forwards
//! the assembled files to the configured storage vendor.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studio_relay::config::RelayConfig;
use studio_relay::session::SessionStore;
use studio_relay::{build_router, relay, AppState};

/// Command-line arguments for studio-relay
#[derive(Parser, Debug)]
#[command(name = "studio-relay")]
#[command(about = "Chunked upload relay for studio clients")]
#[command(version)]
struct Args {
    /// Path to relay.toml
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(short, long, env = "STUDIO_RELAY_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studio_relay=info,studio_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting studio-relay v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let mut config =
        RelayConfig::load(args.config.as_deref()).context("Failed to load relay configuration")?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let relay = relay::build_relay(&config.relay).context("Failed to configure storage relay")?;
    info!("Storage relay: {}", relay.name());

    if config.auth.is_enabled() {
        info!("API authentication enabled ({} tokens)", config.auth.tokens.len());
    } else {
        info!("API authentication disabled (no tokens configured)");
    }

    let state = AppState::from_config(&config, relay);
    spawn_sweeper(state.clone(), config.sweep_interval());

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;
    info!("studio-relay listening on http://{}", config.bind);
    info!("Health check: http://{}/health", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Periodically drop idle upload sessions
fn spawn_sweeper(state: AppState, every: Duration) {
    if every.is_zero() {
        warn!("sweep_interval_secs is 0; idle sessions are only removed via /api/upload/sweep");
        return;
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = state
                .sessions
                .sweep_expired(state.session_timeout, Utc::now())
                .await;
            if removed > 0 {
                info!(removed, "Swept idle upload sessions");
            }
        }
    });
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
