//! # Health Monitor Daemon
//!
//! Watches the ledger for false successes and cross-store leaks until it is
//! stopped with Ctrl+C or SIGTERM.
//!
//! ## Usage
//! ```bash
//! # Default config (platform config dir, larder.toml)
//! cargo run -p larder-engine --bin health-monitor
//!
//! # Explicit config file, one store, verbose
//! RUST_LOG=debug LARDER_MONITOR_STORE_ID=store-demo \
//!     cargo run -p larder-engine --bin health-monitor -- ./larder.toml
//! ```
//!
//! ## Startup Sequence
//! ```text
//! init_tracing ──► LarderConfig::load ──► Database::new ──► stock report
//!                                                              │
//!               alerts ◄── HealthMonitor::run (spawned) ◄──────┘
//!                  │
//!                  └── JSON lines on stdout until shutdown_signal()
//! ```
//!
//! Logs go to stderr; stdout carries only alerts.

use std::env;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use larder_db::Database;
use larder_engine::{HealthMonitor, LarderConfig, MonitorHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = LarderConfig::load(config_path)?;

    info!(
        db = %config.database.path.display(),
        interval_secs = config.monitor.interval_secs,
        window_minutes = config.monitor.window_minutes,
        "Starting health monitor"
    );

    let db = Database::new(config.database.db_config()).await?;
    if !db.health_check().await {
        return Err("ledger database is not answering queries".into());
    }
    let monitor = HealthMonitor::from_database(db.clone());

    if let Some(store_id) = config.monitor.store_id.as_deref() {
        match monitor.stock_report(store_id).await {
            Ok(report) => info!(
                store_id = %report.store_id,
                active = report.active_items,
                low = report.low_stock.len(),
                out = report.out_of_stock.len(),
                "Stock report"
            ),
            Err(e) => warn!(error = %e, "Could not build stock report"),
        }
    }

    let (handle, shutdown_rx) = MonitorHandle::new();
    let (alert_tx, mut alert_rx) = mpsc::channel(config.monitor.alert_channel_capacity);
    let task = tokio::spawn(monitor.run(config.monitor.clone(), alert_tx, shutdown_rx));

    let mut alerts = 0u64;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(alert) = alert_rx.recv() => {
                alerts += 1;
                // One JSON object per line on stdout for dashboards
                match serde_json::to_string(&alert) {
                    Ok(line) => println!("{}", line),
                    Err(e) => warn!(error = %e, "Could not encode alert"),
                }
            }
            _ = &mut shutdown => break,
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Monitor already stopped");
    }
    if let Err(e) = task.await {
        error!(error = %e, "Monitor task panicked");
    }
    db.close().await;

    info!(alerts, "Health monitor exited");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,larder=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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

    info!("Shutdown signal received");
}
