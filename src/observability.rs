use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total statements executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "daybook_queries_total";

/// Histogram: statement latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "daybook_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "daybook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "daybook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "daybook_connections_rejected_total";

/// Gauge: number of loaded tenants.
pub const TENANTS_ACTIVE: &str = "daybook_tenants_active";

/// Counter: statements refused by the access guard.
pub const ACCESS_DENIED_TOTAL: &str = "daybook_access_denied_total";

// ── Calendar writes ─────────────────────────────────────────────

/// Counter: slot rows written by the engine. Labels: kind (insert, update, delete).
pub const SLOT_WRITES_TOTAL: &str = "daybook_slot_writes_total";

/// Counter: bulk pairs skipped because the key was booked.
pub const BOOKED_SKIPS_TOTAL: &str = "daybook_booked_skips_total";

// ── Journal ─────────────────────────────────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "daybook_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "daybook_journal_flush_batch_size";

/// Counter: completed journal compactions.
pub const JOURNAL_COMPACTIONS_TOTAL: &str = "daybook_journal_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SetDaySlots { .. } => "set_day_slots",
        Command::BulkSetAvailability { .. } => "bulk_set_availability",
        Command::RecordBooking { .. } => "record_booking",
        Command::ListSlots { .. } => "list_slots",
    }
}
