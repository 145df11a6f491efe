use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total requests handled. Labels: command, status.
pub const REQUESTS_TOTAL: &str = "courtbook_requests_total";

/// Histogram: request latency in seconds. Labels: command.
pub const REQUEST_DURATION_SECONDS: &str = "courtbook_request_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: reservations committed.
pub const RESERVATIONS_COMMITTED_TOTAL: &str = "courtbook_reservations_committed_total";

/// Counter: reservation requests rejected. Labels: reason.
pub const RESERVATIONS_REJECTED_TOTAL: &str = "courtbook_reservations_rejected_total";

/// Counter: occupancy reports built.
pub const OCCUPANCY_QUERIES_TOTAL: &str = "courtbook_occupancy_queries_total";

/// Counter: reservations skipped because their court no longer exists.
pub const DATA_INTEGRITY_WARNINGS_TOTAL: &str = "courtbook_data_integrity_warnings_total";

/// Counter: store/registry calls that hit the timeout. Labels: dependency.
pub const DEPENDENCY_TIMEOUTS_TOTAL: &str = "courtbook_dependency_timeouts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "courtbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "courtbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "courtbook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "courtbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "courtbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a request to a short label for metrics.
pub fn command_label(req: &Request) -> &'static str {
    match req {
        Request::CommitReservation { .. } => "commit_reservation",
        Request::GetOccupancy { .. } => "get_occupancy",
        Request::ChangeSlotDuration { .. } => "change_slot_duration",
        Request::Ping => "ping",
    }
}
