use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: method, route, status.
pub const REQUESTS_TOTAL: &str = "courtside_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const REQUEST_DURATION_SECONDS: &str = "courtside_request_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: bookings committed.
pub const BOOKINGS_CREATED_TOTAL: &str = "courtside_bookings_created_total";

/// Counter: bookings removed.
pub const BOOKINGS_DELETED_TOTAL: &str = "courtside_bookings_deleted_total";

/// Counter: booking requests rejected for overlapping an existing booking.
pub const BOOKING_CONFLICTS_TOTAL: &str = "courtside_booking_conflicts_total";

/// Counter: grid slots created by daily generation.
pub const SLOTS_CREATED_TOTAL: &str = "courtside_slots_created_total";

/// Counter: grid slots skipped because they already existed.
pub const SLOTS_SKIPPED_TOTAL: &str = "courtside_slots_skipped_total";

/// Counter: grid slots that failed to persist.
pub const SLOTS_FAILED_TOTAL: &str = "courtside_slots_failed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: registered venues.
pub const VENUES_ACTIVE: &str = "courtside_venues_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtside_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtside_wal_flush_batch_size";

/// Install the Prometheus exporter on `port`. No-op if `port` is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Status label for request metrics: the class of the code, e.g. `4xx`.
pub fn status_class(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(status_class(201), "2xx");
        assert_eq!(status_class(409), "4xx");
        assert_eq!(status_class(500), "5xx");
    }
}
