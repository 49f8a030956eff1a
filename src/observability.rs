use std::net::SocketAddr;

use crate::command::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total control commands executed. Labels: command, status.
pub const REQUESTS_TOTAL: &str = "spacebook_requests_total";

/// Histogram: command latency in seconds. Labels: command.
pub const REQUEST_DURATION_SECONDS: &str = "spacebook_request_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "spacebook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "spacebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "spacebook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "spacebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "spacebook_wal_flush_batch_size";

// ── Booking ─────────────────────────────────────────────────────

/// Counter: availability checks. Labels: result (available, unavailable).
pub const AVAILABILITY_CHECKS_TOTAL: &str = "spacebook_availability_checks_total";

/// Counter: inserts refused at the capacity re-check.
pub const BOOKINGS_REJECTED_TOTAL: &str = "spacebook_bookings_rejected_total";

// ── Lifecycle ───────────────────────────────────────────────────

/// Counter: lifecycle scans that ran. Labels: status (ok, error).
pub const LIFECYCLE_RUNS_TOTAL: &str = "spacebook_lifecycle_runs_total";

/// Counter: timer ticks dropped because a scan was still in flight.
pub const LIFECYCLE_TICKS_SKIPPED_TOTAL: &str = "spacebook_lifecycle_ticks_skipped_total";

/// Counter: automatic status transitions. Labels: reason.
pub const LIFECYCLE_TRANSITIONS_TOTAL: &str = "spacebook_lifecycle_transitions_total";

/// Counter: scan failures. Labels: kind (read, write).
pub const LIFECYCLE_RUN_ERRORS_TOTAL: &str = "spacebook_lifecycle_run_errors_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
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
        Command::CheckAvailability { .. } => "check_availability",
        Command::DailyOccupancy { .. } => "daily_occupancy",
        Command::CreateReservation { .. } => "create_reservation",
        Command::Confirm { .. } => "confirm",
        Command::Cancel { .. } => "cancel",
        Command::GetReservation { .. } => "get_reservation",
        Command::ListReservations { .. } => "list_reservations",
        Command::SchedulerStatus => "scheduler_status",
        Command::SchedulerConfig => "scheduler_config",
        Command::ConfigureScheduler { .. } => "configure_scheduler",
        Command::RunNow => "run_now",
        Command::StartScheduler => "start_scheduler",
        Command::StopScheduler => "stop_scheduler",
        Command::Listen { .. } => "listen",
        Command::Unlisten => "unlisten",
    }
}
