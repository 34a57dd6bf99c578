//! fieldsrv binary
//!
//! Loads the configuration, wires the connection registry, health monitor,
//! and threshold engine together, and runs until interrupted.

use anyhow::Result;
use clap::Parser;
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fieldsrv::connection::{
    start_health_monitor, ActorContext, BackoffPolicy, CircuitBreaker, ConnectionRegistry,
    ReconnectScheduler,
};
use fieldsrv::control::{BarrierController, EventDeduper, ThresholdEngine};
use fieldsrv::dispatch::MessageDispatcher;
use fieldsrv::logging::{init_logging, LogConfig};
use fieldsrv::sinks::LogSink;
use fieldsrv::{Config, DeviceTable};

#[derive(Parser, Debug)]
#[command(name = "fieldsrv", about = "Field device connection and control service")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "FIELDSRV_CONFIG")]
    config: Option<String>,

    /// Override the configured log level
    #[arg(long, env = "FIELDSRV_LOG_LEVEL")]
    log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let log_config = LogConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.service.log_level.clone()),
        file: config.service.log_file.clone(),
        ..LogConfig::default()
    };
    let _log_guard = init_logging(&log_config)?;

    if args.check {
        info!(devices = config.devices.len(), "Configuration OK");
        return Ok(());
    }

    info!(
        service = %config.service.name,
        devices = config.devices.len(),
        "Starting field device service"
    );

    let devices = Arc::new(DeviceTable::new(config.devices.clone()));
    let sink = Arc::new(LogSink);

    let breaker = Arc::new(CircuitBreaker::new(&config.circuit));
    let statuses = Arc::new(DashMap::new());
    let scheduler = Arc::new(ReconnectScheduler::new(
        BackoffPolicy::new(&config.reconnect),
        Arc::clone(&breaker),
        Arc::clone(&statuses),
    ));
    let ctx = Arc::new(ActorContext {
        breaker,
        scheduler,
        statuses,
        persistence: sink.clone(),
        publisher: sink.clone(),
        timeouts: config.timeouts.clone(),
    });

    let registry = Arc::new(ConnectionRegistry::new(Arc::clone(&devices), ctx));
    let dispatcher = Arc::new(MessageDispatcher::new(Arc::clone(&registry)));
    let barrier = Arc::new(BarrierController::new(
        Arc::clone(&dispatcher),
        config.barrier.pulse(),
    ));
    let engine = Arc::new(ThresholdEngine::new(
        Arc::clone(&devices),
        dispatcher,
        barrier,
        Arc::new(EventDeduper::new()),
        sink.clone(),
        sink.clone(),
        sink,
        config.polling.clone(),
    ));

    registry.connect_all().await?;

    let shutdown = CancellationToken::new();
    let health = start_health_monitor(
        Arc::clone(&registry),
        config.health.clone(),
        shutdown.clone(),
    );
    let engine_task = engine.start(shutdown.clone());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();

    if let Err(e) = engine_task.await {
        error!(error = %e, "Threshold engine task failed");
    }
    if let Err(e) = health.await {
        error!(error = %e, "Health monitor task failed");
    }
    registry.shutdown().await;

    info!("Field device service stopped");
    Ok(())
}
