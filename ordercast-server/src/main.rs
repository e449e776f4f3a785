//! Ordercast Server
//!
//! Real-time order notifications over server-sent events and WebSockets.

mod api;
mod config;
mod notifier;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use ordercast_core::processors::{ConnectionPool, EventBroker};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Ordercast - push order updates to shops and customers
#[derive(Parser, Debug)]
#[command(name = "ordercast-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "ORDERCAST_CONFIG", default_value = "./ordercast.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting ordercast-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Start the coordination loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (broker, broker_loop) = EventBroker::new(loaded_config.broker);
    let (pool, pool_loop) = ConnectionPool::new(loaded_config.pool);
    let broker_handle = tokio::spawn(broker_loop.run(shutdown_rx.clone()));
    let pool_handle = tokio::spawn(pool_loop.run(shutdown_rx));

    // Create application state
    let state = AppState::new(broker, pool, loaded_config.stream);

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    // Build the router
    let router = build_router(state, &loaded_config.server);

    // Run the server
    let listen_addr = loaded_config.server.listen;
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_tx).await;
    if let Err(e) = &result {
        tracing::error!("HTTP server failed: {}", e);
    }

    // Signal the config reload handler to stop
    reload_notify.notify_one();

    // The shutdown sender is gone by now, which also stops both loops.
    let _ = tokio::join!(broker_handle, pool_handle);
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
