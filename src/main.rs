//! shard-fleet - every shard of a Discord bot in one process
//!
//! Startup order:
//! - configuration, logging and metrics
//! - optional NATS relays for events and operator logs
//! - fleet sizing, then the health server, then shard connection
//! - module activation once every shard is up

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use shard_fleet::config::FleetConfig;
use shard_fleet::events::{EventListener, GuildLogListener, RelayListener};
use shard_fleet::health::{self, AppState};
use shard_fleet::logging::{self, LogRelay};
use shard_fleet::metrics::FleetMetrics;
use shard_fleet::modules::ModuleRegistry;
use shard_fleet::nats::NatsPublisher;
use shard_fleet::orchestrator::FleetOrchestrator;
use shard_fleet::shard::{GatewayConnector, GatewayShardCount};

const RELAY_CAPACITY: usize = 4096;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first to get log level
    let config = FleetConfig::load()?;

    let (log_relay, log_queue) = LogRelay::new(RELAY_CAPACITY);
    logging::init(&config.log_level, Some(&log_relay))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        total_shards = ?config.total_shards,
        "Starting shard fleet"
    );

    let metrics = match FleetMetrics::install() {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            warn!(error = %e, "Prometheus metrics unavailable");
            None
        }
    };

    // Connect to NATS if configured
    let nats = if let Some(ref url) = config.nats_url {
        match NatsPublisher::connect(url).await {
            Ok(publisher) => Some(publisher),
            Err(e) => {
                error!(error = %e, "Failed to connect to NATS - running without relays");
                None
            }
        }
    } else {
        info!("No NATS_URL configured - running without relays");
        None
    };

    let mut listeners: Vec<Arc<dyn EventListener>> = vec![Arc::new(GuildLogListener)];
    if let Some(ref publisher) = nats {
        let (events_tx, events_rx) = tokio::sync::mpsc::channel(RELAY_CAPACITY);
        tokio::spawn(Arc::clone(publisher).forward(events_rx));
        tokio::spawn(Arc::clone(publisher).forward(log_queue));
        listeners.push(Arc::new(RelayListener::new(events_tx)));
    } else {
        drop(log_queue);
    }

    let intents = FleetConfig::intents();
    info!(?intents, "Using Discord intents");

    let connector = GatewayConnector::new(config.discord_token.clone(), intents, config.connect_timeout());
    let source = GatewayShardCount::new(config.discord_token.clone(), config.recommend_timeout());
    let http_port = config.http_port;

    let orchestrator = FleetOrchestrator::new(config, connector, source, ModuleRegistry::builtin())
        .with_listeners(listeners)
        .with_log_relay(log_relay.clone());

    let prepared = match orchestrator.prepare().await {
        Ok(prepared) => prepared,
        Err(e) => startup_failed(&log_relay, &e),
    };

    // Start health server while shards connect
    let app_state = AppState {
        fleet: Arc::clone(prepared.fleet()),
        nats: nats.clone(),
        metrics,
    };
    let addr: SocketAddr = ([0, 0, 0, 0], http_port).into();
    info!(port = http_port, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let mut http_server = tokio::spawn(async move { axum::serve(listener, health::router(app_state)).await });

    let ready = tokio::select! {
        result = prepared.launch() => match result {
            Ok(ready) => ready,
            Err(e) => startup_failed(&log_relay, &e),
        },
        _ = shutdown_signal() => {
            info!("Shutdown signal received during startup");
            close_nats(nats.as_deref()).await;
            return Ok(());
        }
    };

    info!(
        total_shards = ready.fleet.total_shards(),
        modules = ready.modules.len(),
        "Fleet running"
    );

    tokio::select! {
        result = &mut http_server => {
            match result {
                Ok(Err(e)) => error!(error = %e, "HTTP server error"),
                Err(e) => error!(error = %e, "HTTP server task failed"),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    // Graceful shutdown
    info!("Shutting down fleet...");
    log_relay.disable();
    close_nats(nats.as_deref()).await;

    info!("Fleet shutdown complete");
    Ok(())
}

/// Startup cannot recover: report once, locally, and exit
fn startup_failed(relay: &LogRelay, e: &shard_fleet::FleetError) -> ! {
    relay.disable();
    error!(error = %e, error_type = e.error_type_label(), "Fleet startup failed");
    std::process::exit(1);
}

async fn close_nats(nats: Option<&NatsPublisher>) {
    if let Some(nats) = nats {
        nats.close().await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
