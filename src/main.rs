use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use courtside::engine::Engine;
use courtside::notify::NotifyHub;
use courtside::{api, scheduler};

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let metrics_port: Option<u16> = std::env::var("COURTSIDE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    courtside::observability::init(metrics_port)?;

    let port: u16 = env_or("COURTSIDE_PORT", 8080);
    let bind = std::env::var("COURTSIDE_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = PathBuf::from(std::env::var("COURTSIDE_DATA_DIR").unwrap_or_else(|_| "./data".into()));
    let compact_threshold: u64 = env_or("COURTSIDE_COMPACT_THRESHOLD", 1000);
    let slot_interval = Duration::from_secs(env_or::<u64>("COURTSIDE_SLOT_INTERVAL_SECS", 3600).max(1));

    std::fs::create_dir_all(&data_dir)?;
    let engine = Arc::new(Engine::new(data_dir.join("courtside.wal"), Arc::new(NotifyHub::new()))?);

    let background = CancellationToken::new();
    let generator = tokio::spawn(scheduler::run_slot_generator(
        engine.clone(),
        slot_interval,
        background.clone(),
    ));
    let compactor = tokio::spawn(scheduler::run_compactor(
        engine.clone(),
        compact_threshold,
        background.clone(),
    ));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("courtside listening on {addr}");
    info!("  data_dir: {}", data_dir.display());
    info!("  slot interval: {}s", slot_interval.as_secs());
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    axum::serve(listener, api::router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, stopping background tasks");
    background.cancel();
    let _ = tokio::join!(generator, compactor);
    info!("courtside stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}
