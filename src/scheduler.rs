use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineError, now_ms};

/// Periodically materialize the next day's slot grid. Runs once at startup,
/// then every `period`. Reruns within the same day only skip.
pub async fn run_slot_generator(engine: Arc<Engine>, period: Duration, shutdown: CancellationToken) {
    info!(period_secs = period.as_secs(), "slot generator started");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        match engine.generate_daily_slots(now_ms()).await {
            Ok(report) if report.created_count > 0 => {
                info!(created = report.created_count, "scheduled slot generation")
            }
            Ok(_) => debug!("scheduled slot generation: grid already complete"),
            Err(EngineError::NoVenues) => debug!("scheduled slot generation: no venues yet"),
            Err(e) => warn!("scheduled slot generation failed: {e}"),
        }
    }
    info!("slot generator stopped");
}

/// Compact the WAL whenever `threshold` appends have accumulated since the
/// last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        if let Err(e) = engine.compact_wal().await {
            warn!(appends, "WAL compaction failed: {e}");
        }
    }
    debug!("compactor stopped");
}
