//! Kiosk POS client.
//!
//! Keeps a local cart, submits it to the backend as an order and keeps the
//! order and menu views in step with the backend through a fixed 2 s poll.
//! The library is UI-agnostic: presentation code reads snapshots and
//! subscribes to the `watch` channels exposed by the cart and the views.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod api;
pub mod cart;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod submission;
pub mod view_sync;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{Gateway, HttpGateway, RetryPolicy};
pub use cart::{Cart, CartAggregator};
pub use config::{Config, POLL_INTERVAL};
pub use error::{KioskError, RemoteError};
pub use models::{CartLine, NewMenuItem, NewOrder, Order, OrderItem, Product};
pub use scheduler::{PollingScheduler, SchedulerState};
pub use session::KioskSession;
pub use submission::{OrderSubmissionFlow, SubmissionState};
pub use view_sync::{RefreshReport, Snapshot, SnapshotUpdate, ViewSyncController};

/// Install console + daily rolling file logging. The returned guard flushes
/// the file writer when dropped.
pub fn init_logging(log_dir: &Path, json_file: bool) -> WorkerGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kiosk_pos_lib=debug"));

    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs(log_dir);
    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = json_file.then(|| {
        fmt::layer()
            .json()
            .with_writer(non_blocking.clone())
            .with_target(true)
    });
    let text_layer = (!json_file).then(|| {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
    });
    let console_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(json_layer)
        .with(text_layer)
        .init();

    guard
}

/// Binary entry point: run one kiosk session against the configured backend
/// until Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    let config = Config::load();
    let _guard = init_logging(&config.log_dir, config.log_json);

    let about = diagnostics::about_info();
    info!(
        version = about.version,
        git_sha = about.git_sha,
        api_url = %config.api_url,
        "Starting kiosk-pos"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run_session(config))
}

async fn run_session(config: Config) -> anyhow::Result<()> {
    let gateway =
        Arc::new(HttpGateway::from_config(&config).context("failed to create HTTP client")?);

    match gateway.check_health().await {
        Ok(latency) => info!(latency_ms = latency.as_millis() as u64, "Backend reachable"),
        Err(e) => warn!(error = %e, "Backend health check failed, polling anyway"),
    }

    let session = KioskSession::new(gateway);
    let mut orders_rx = session.view().subscribe_orders();
    let mut menu_rx = session.view().subscribe_menu();
    session.init().await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            res = &mut shutdown => {
                if let Err(e) = res {
                    warn!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
            Ok(()) = orders_rx.changed() => {
                let snapshot = orders_rx.borrow_and_update().clone();
                info!(
                    count = snapshot.items.len(),
                    generation = snapshot.generation,
                    "Orders updated"
                );
            }
            Ok(()) = menu_rx.changed() => {
                let snapshot = menu_rx.borrow_and_update().clone();
                info!(
                    count = snapshot.items.len(),
                    generation = snapshot.generation,
                    "Menu updated"
                );
            }
        }
    }

    session.teardown();
    Ok(())
}
