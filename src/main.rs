//! Sensorhub Server
//!
//! Run with: cargo run --bin sensorhub -- --config config.toml
//!
//! Configuration is read from `--config`, else from the first existing
//! default location, and `SENSORHUB_*` environment variables override it.
//! `RUST_LOG` takes precedence over the configured log level.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sensorhub::api::{serve, AppState};
use sensorhub::config::{Config, LoggingConfig};
use sensorhub::relay::{CommandRelay, HttpTransport, StatusPoller, Transport};
use sensorhub::telemetry::{Registry, StalenessSweeper};
use sensorhub::websocket::EventFanout;

#[derive(Parser)]
#[command(name = "sensorhub")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "IoT device registry and telemetry relay")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sensorhub={},tower_http=info",
            logging.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config.logging);
    tracing::info!("Starting Sensorhub v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        history = config.registry.history_capacity,
        stale_time_ms = config.registry.stale_time_ms,
        sweep_interval_ms = config.registry.sweep_interval_ms,
        "Registry configured"
    );

    let fanout = Arc::new(EventFanout::new(config.fanout.clone()));
    let registry = Arc::new(Registry::new(config.registry.clone(), fanout));

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.transport.clone())?);
    let relay = CommandRelay::new(Arc::clone(&transport), config.transport.sense_resource.clone())
        .with_observe_interval(Duration::from_millis(config.transport.observe_interval_ms));

    let sweeper = StalenessSweeper::new(Arc::clone(&registry)).spawn();
    let poller = StatusPoller::new(
        Arc::clone(&registry),
        transport,
        config.transport.status_resource.clone(),
        Duration::from_millis(config.transport.status_poll_interval_ms),
    )
    .spawn();

    let state = AppState::new(registry, relay, config.server.clone());
    let result = serve(state, &config.server).await;

    sweeper.abort();
    if let Some(poller) = poller {
        poller.abort();
    }

    result?;
    tracing::info!("Sensorhub shutdown complete");
    Ok(())
}
