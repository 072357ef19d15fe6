use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "rental_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "rental_operation_duration_seconds";

/// Counter: reservation requests refused because the dates were taken.
pub const CONFLICTS_TOTAL: &str = "rental_conflicts_total";

/// Counter: notifications that could not be recorded. Labels: kind.
pub const NOTIFICATION_FAILURES_TOTAL: &str = "rental_notification_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: equipment records loaded in memory.
pub const EQUIPMENT_ACTIVE: &str = "rental_equipment_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "rental_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (records per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "rental_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record the outcome of one engine operation.
pub fn record_operation<T, E>(op: &'static str, started: std::time::Instant, result: &Result<T, E>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}
