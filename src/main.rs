use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};

use floodgate::clock::SystemClock;
use floodgate::config::FloodgateConfig;
use floodgate::http::{GateState, HttpServer};
use floodgate::ratelimit::{spawn_sweeper, InMemoryStore, LimitRules, RateLimiter};

#[derive(Parser, Debug)]
#[command(name = "floodgate")]
#[command(about = "Per-client request admission service", version)]
struct Args {
    /// Path to the service configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured listen address
    #[arg(short, long)]
    listen: Option<std::net::SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    info!("Starting Floodgate Admission Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match args.config.as_deref() {
        Some(path) => FloodgateConfig::from_file(path)?,
        None => FloodgateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let rules = match config.rate_limiting.rules_path.as_deref() {
        Some(path) => LimitRules::from_file(path)?,
        None => LimitRules::new(),
    };

    let store = Arc::new(InMemoryStore::new());
    let clock = Arc::new(SystemClock);
    let limiter = Arc::new(RateLimiter::with_rules(store.clone(), rules));
    info!("Rate limiter initialized");

    spawn_sweeper(
        store,
        clock.clone(),
        config.rate_limiting.sweep_interval(),
        config.rate_limiting.stale_grace(),
    );

    let state = GateState {
        limiter,
        clock,
        trust_forwarded_for: config.server.trust_forwarded_for,
    };

    let server = HttpServer::new(config.server.listen_addr, state);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("Floodgate Admission Service stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
