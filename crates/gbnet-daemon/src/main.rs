//! gbnetd: the GBNet compensation daemon.
//!
//! Single OS process running a Tokio async runtime. Clients talk to it with
//! JSON-RPC over a Unix socket; a scheduler task runs the daily sweep and
//! the monthly salary run at 00:00 UTC.

mod commands;
mod config;
mod epoch;
mod events;
mod rpc;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Database connection. Held for the whole of each request.
    pub db: Arc<tokio::sync::Mutex<rusqlite::Connection>>,
    pub config: DaemonConfig,
    /// Event bus for pushing events to subscribers.
    pub event_bus: EventBus,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config comes first so its log level can seed the filter.
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_directive().parse()?),
        )
        .init();

    info!("GBNet daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let db_path = data_dir.join("gbnet.db");
    let conn = gbnet_db::open(&db_path)?;
    info!(path = ?db_path, "database open");
    let db = Arc::new(tokio::sync::Mutex::new(conn));

    let event_bus = EventBus::new(config.server.event_buffer);
    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

    let socket_path = config.socket_path();
    let state = Arc::new(DaemonState {
        db,
        config,
        event_bus,
        shutdown_tx: shutdown_tx.clone(),
    });

    if state.config.server.maintenance_enabled {
        tokio::spawn(epoch::run_scheduler(state.clone(), shutdown_tx.subscribe()));
    } else {
        info!("scheduler disabled; maintenance runs only on request");
    }

    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    state.event_bus.emit(
        "DaemonStarted",
        gbnet_types::time::now(),
        serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
    );

    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // stop the scheduler
    let _ = state.shutdown_tx.send(());
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
