mod error;
pub mod fee;
mod mutations;
mod plate;
mod queries;

pub use error::EngineError;
pub use fee::compute_fee;
pub(crate) use mutations::exit_message;
pub use plate::validate_license_plate;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::ConfigStore;
use crate::ledger::Ledger;
use crate::model::*;
use crate::retry::RetryPolicy;

/// The parking ledger and occupancy state machine.
///
/// Single-writer: mutation takes `&mut self` and persists the full ledger
/// before returning. Callers that need concurrency put the engine behind
/// one owning task (see `controller`).
pub struct Engine {
    config: ConfigStore,
    ledger: Ledger,
    /// Every visit, open and closed, in entry order.
    visits: Vec<Visit>,
    total_spaces: u32,
    /// Number of open visits, tracked incrementally after startup.
    occupied: u32,
    hourly_rate: f64,
    gate_status: GateStatus,
}

impl Engine {
    /// Load the config file at `config_path` (defaults are written if it is
    /// absent), then open the engine on it. Relative ledger names resolve
    /// against `data_dir`.
    pub fn open_path(
        config_path: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Result<Self, EngineError> {
        let config = ConfigStore::load(config_path)?.with_data_dir(data_dir);
        Self::open(config)
    }

    /// Load configuration values and the ledger. A missing ledger is created
    /// empty and persisted immediately.
    pub fn open(config: ConfigStore) -> Result<Self, EngineError> {
        let ledger = Ledger::new(config.records_path(), RetryPolicy::default());
        let visits = match ledger.load() {
            Ok(Some(visits)) => visits,
            Ok(None) => {
                ledger
                    .save(&[])
                    .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;
                info!("created empty ledger at {}", ledger.path().display());
                Vec::new()
            }
            Err(e) => {
                return Err(EngineError::PersistenceFailure(format!(
                    "{}: {e}",
                    ledger.path().display()
                )));
            }
        };

        let total_spaces = config.total_spaces();
        let open_count = visits.iter().filter(|v| v.is_open()).count();
        let occupied = u32::try_from(open_count).unwrap_or(u32::MAX);
        if occupied > total_spaces {
            warn!(
                "ledger holds {occupied} open visits but capacity is {total_spaces}; lot reported full"
            );
        }

        let engine = Self {
            hourly_rate: config.hourly_rate(),
            config,
            ledger,
            visits,
            total_spaces,
            occupied,
            gate_status: GateStatus::Closed,
        };
        engine.warn_duplicate_open_visits();
        engine.publish_available();
        info!(
            "ledger loaded: {} visits, {} open, {}/{} spaces free",
            engine.visits.len(),
            engine.occupied,
            engine.available_spaces(),
            engine.total_spaces
        );
        Ok(engine)
    }

    /// Override the retry policy used for ledger writes.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.ledger.set_retry_policy(retry);
        self.config = self.config.with_retry_policy(retry);
        self
    }

    pub fn validate_license_plate(&self, plate: &str) -> bool {
        validate_license_plate(plate)
    }

    /// Write the current table. Callers roll back their in-memory change on error.
    fn persist(&self) -> Result<(), EngineError> {
        self.ledger.save(&self.visits).map_err(|e| {
            tracing::error!("ledger write to {} failed: {e}", self.ledger.path().display());
            EngineError::PersistenceFailure(e.to_string())
        })
    }

    fn publish_available(&self) {
        metrics::gauge!(crate::observability::AVAILABLE_SPACES).set(self.available_spaces() as f64);
    }

    /// A hand-edited ledger can carry two open rows for one plate. Exits close
    /// the earliest, so this is only reported.
    fn warn_duplicate_open_visits(&self) {
        let mut seen = std::collections::HashSet::new();
        for v in self.visits.iter().filter(|v| v.is_open()) {
            if !seen.insert(v.license_plate.as_str()) {
                warn!("ledger has more than one open visit for {}", v.license_plate);
            }
        }
    }
}
