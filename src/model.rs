use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Local wall-clock time, the only time type in the ledger.
pub type Timestamp = NaiveDateTime;

/// Format used when writing timestamps to the ledger file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Formats accepted when reading timestamps back, tried in order.
const ACCEPTED_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub fn now() -> Timestamp {
    Local::now().naive_local()
}

pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a ledger timestamp. RFC 3339 strings carrying an offset are
/// converted to local time.
pub fn parse_timestamp(s: &str) -> Option<Timestamp> {
    let s = s.trim();
    for fmt in ACCEPTED_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Local).naive_local())
}

/// One parking session. A plate may have many visits, but at most one open.
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub license_plate: String,
    pub entry_time: Timestamp,
    /// `None` while the vehicle is still parked.
    pub exit_time: Option<Timestamp>,
    /// Zero while open, fixed at close.
    pub fee: f64,
}

impl Visit {
    pub fn open(license_plate: impl Into<String>, entry_time: Timestamp) -> Self {
        Self {
            license_plate: license_plate.into(),
            entry_time,
            exit_time: None,
            fee: 0.0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    pub fn entry_date(&self) -> NaiveDate {
        self.entry_time.date()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateStatus {
    Closed,
    Open,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStatus::Closed => "closed",
            GateStatus::Open => "open",
        }
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParkingStatus {
    pub total_spaces: u32,
    pub available_spaces: u32,
    pub gate_status: GateStatus,
}

impl ParkingStatus {
    pub fn occupied(&self) -> u32 {
        self.total_spaces - self.available_spaces
    }
}

/// Aggregate over a set of visits, used for reports.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ReportSummary {
    pub visits: usize,
    pub closed: usize,
    pub open: usize,
    pub revenue: f64,
}

impl ReportSummary {
    pub fn from_visits<'a>(visits: impl IntoIterator<Item = &'a Visit>) -> Self {
        let mut summary = Self::default();
        for v in visits {
            summary.visits += 1;
            if v.is_open() {
                summary.open += 1;
            } else {
                summary.closed += 1;
                summary.revenue += v.fee;
            }
        }
        summary.revenue = (summary.revenue * 100.0).round() / 100.0;
        summary
    }
}

/// Events published to presentation observers. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GateEvent {
    PlateDecided { plate: String },
    VehicleEntered { plate: String, at: Timestamp },
    VehicleExited { plate: String, at: Timestamp, fee: f64 },
    RateUpdated { hourly_rate: f64 },
}
