//! fieldtrack - real-time technician tracking telemetry service
//!
//! Distributes location updates and geofence arrival events from field
//! technicians to operators, the technicians themselves and waiting
//! customers over long-lived SSE streams.
//!
//! Module structure:
//! - `domain/` - Core types (presences, reports, events)
//! - `infra/` - Infrastructure (config, segmented event bus)
//! - `services/` - Business logic (geo math, location store, ingest)
//! - `io/` - External surface (HTTP server, stream sessions)

use clap::Parser;
use fieldtrack::infra::{Config, EventBus};
use fieldtrack::io::{start_server, AppContext};
use fieldtrack::services::{
    BookingDirectory, InMemoryBookingDirectory, LocationIngestCoordinator, LocationStore,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// fieldtrack - technician tracking telemetry service
#[derive(Parser, Debug)]
#[command(name = "fieldtrack", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Structured logging, level via RUST_LOG (default INFO)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("fieldtrack starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        bind_address = %config.bind_address(),
        port = %config.port(),
        throttle_ms = %config.throttle_ms(),
        geofence_radius_m = %config.geofence_radius_m(),
        heartbeat_secs = %config.heartbeat_secs(),
        queue_capacity = %config.queue_capacity(),
        "config_loaded"
    );

    // Process-wide singletons, passed explicitly into request handling
    let store = Arc::new(LocationStore::new(config.throttle_ms()));
    let bus = Arc::new(EventBus::new(config.queue_capacity()));
    let directory = Arc::new(InMemoryBookingDirectory::new());
    let coordinator = Arc::new(LocationIngestCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&directory) as Arc<dyn BookingDirectory>,
        config.geofence_radius_m(),
    ));

    let ctx = Arc::new(AppContext {
        store,
        bus,
        coordinator,
        directory,
        heartbeat: Duration::from_secs(config.heartbeat_secs()),
    });

    // Handle shutdown on Ctrl+C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    start_server(&config, ctx, shutdown_rx).await?;

    info!("fieldtrack shutdown complete");
    Ok(())
}
