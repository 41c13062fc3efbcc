use std::net::SocketAddr;

use crate::command::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total operator commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "parklot_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "parklot_command_duration_seconds";

/// Counter: accepted vehicle entries.
pub const ENTRIES_TOTAL: &str = "parklot_entries_total";

/// Counter: completed vehicle exits.
pub const EXITS_TOTAL: &str = "parklot_exits_total";

/// Counter: rejected entry/exit/rate requests. Labels: reason.
pub const REJECTIONS_TOTAL: &str = "parklot_rejections_total";

/// Histogram: fee charged per completed visit.
pub const EXIT_FEE: &str = "parklot_exit_fee";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: free spaces.
pub const AVAILABLE_SPACES: &str = "parklot_available_spaces";

/// Histogram: full ledger rewrite duration in seconds, retries included.
pub const LEDGER_WRITE_DURATION_SECONDS: &str = "parklot_ledger_write_duration_seconds";

/// Counter: plate decisions produced by the voting window.
pub const PLATE_DECISIONS_TOTAL: &str = "parklot_plate_decisions_total";

/// Counter: recognition candidates dropped because a window was full.
pub const CANDIDATES_DROPPED_TOTAL: &str = "parklot_candidates_dropped_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Entry { .. } => "entry",
        Command::Exit { .. } => "exit",
        Command::Status => "status",
        Command::Current => "current",
        Command::Rate { .. } => "rate",
        Command::Records { .. } => "records",
        Command::Report { .. } => "report",
        Command::Validate { .. } => "validate",
        Command::Gate { .. } => "gate",
        Command::Candidate { .. } => "candidate",
        Command::Help => "help",
        Command::Quit => "quit",
    }
}
