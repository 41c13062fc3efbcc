use tracing::{info, warn};

use crate::limits::MAX_HOURLY_RATE;
use crate::model::*;

use super::fee::compute_fee;
use super::plate::normalize_plate;
use super::{Engine, EngineError};

pub(crate) fn exit_message(visit: &Visit) -> String {
    format!("vehicle {} exited, fee: {:.2}", visit.license_plate, visit.fee)
}

fn count_rejection(err: &EngineError) {
    if err.is_rejection() {
        metrics::counter!(crate::observability::REJECTIONS_TOTAL, "reason" => err.reason())
            .increment(1);
    }
}

impl Engine {
    pub fn process_entry(&mut self, plate: &str) -> Result<String, EngineError> {
        self.process_entry_at(plate, now())
    }

    /// Record an entry at `at`. Checks run in order: capacity, then duplicate.
    pub fn process_entry_at(&mut self, plate: &str, at: Timestamp) -> Result<String, EngineError> {
        let result = self.try_entry(plate, at);
        match &result {
            Ok(_) => {
                metrics::counter!(crate::observability::ENTRIES_TOTAL).increment(1);
                self.publish_available();
            }
            Err(e) => {
                warn!("entry rejected for {plate:?}: {e}");
                count_rejection(e);
            }
        }
        result
    }

    fn try_entry(&mut self, plate: &str, at: Timestamp) -> Result<String, EngineError> {
        let plate = normalize_plate(plate)?;
        if self.available_spaces() == 0 {
            return Err(EngineError::LotFull);
        }
        if self.is_parked(plate) {
            return Err(EngineError::DuplicateEntry(plate.to_string()));
        }

        self.visits.push(Visit::open(plate, at));
        self.occupied += 1;
        if let Err(e) = self.persist() {
            self.visits.pop();
            self.occupied -= 1;
            return Err(e);
        }

        info!(
            "vehicle {plate} entered at {}, {} spaces free",
            format_timestamp(&at),
            self.available_spaces()
        );
        Ok(format!("vehicle {plate} entered successfully"))
    }

    pub fn process_exit(&mut self, plate: &str) -> Result<String, EngineError> {
        self.process_exit_at(plate, now())
    }

    /// Close the earliest open visit for `plate` at `at` and bill it.
    pub fn process_exit_at(&mut self, plate: &str, at: Timestamp) -> Result<String, EngineError> {
        self.close_visit_at(plate, at).map(|v| exit_message(&v))
    }

    /// Same as `process_exit_at`, returning the closed visit instead of a message.
    pub fn close_visit_at(&mut self, plate: &str, at: Timestamp) -> Result<Visit, EngineError> {
        let result = self.try_exit(plate, at);
        match &result {
            Ok(_) => {
                metrics::counter!(crate::observability::EXITS_TOTAL).increment(1);
                self.publish_available();
            }
            Err(e) => {
                warn!("exit rejected for {plate:?}: {e}");
                count_rejection(e);
            }
        }
        result
    }

    fn try_exit(&mut self, plate: &str, at: Timestamp) -> Result<Visit, EngineError> {
        let plate = normalize_plate(plate)?;
        let idx = self
            .visits
            .iter()
            .position(|v| v.is_open() && v.license_plate == plate)
            .ok_or_else(|| EngineError::NoOpenVisit(plate.to_string()))?;

        let entry_time = self.visits[idx].entry_time;
        if at < entry_time {
            warn!(
                "clock skew: exit {} precedes entry {} for {plate}; billing minimum",
                format_timestamp(&at),
                format_timestamp(&entry_time)
            );
        }
        let fee = compute_fee(entry_time, at, self.hourly_rate);

        let visit = &mut self.visits[idx];
        visit.exit_time = Some(at);
        visit.fee = fee;
        self.occupied = self.occupied.saturating_sub(1);
        if let Err(e) = self.persist() {
            let visit = &mut self.visits[idx];
            visit.exit_time = None;
            visit.fee = 0.0;
            self.occupied += 1;
            return Err(e);
        }

        metrics::histogram!(crate::observability::EXIT_FEE).record(fee);
        info!("vehicle {plate} exited, fee {fee:.2}, {} spaces free", self.available_spaces());
        Ok(self.visits[idx].clone())
    }

    /// Change the hourly rate and persist it. Closed visits keep their fee.
    pub fn update_rate(&mut self, new_rate: f64) -> Result<(), EngineError> {
        if !new_rate.is_finite() || new_rate <= 0.0 || new_rate > MAX_HOURLY_RATE {
            let err = EngineError::InvalidRate(new_rate);
            count_rejection(&err);
            return Err(err);
        }
        self.config
            .set_hourly_rate(new_rate)
            .map_err(|e| EngineError::PersistenceFailure(e.to_string()))?;
        info!("hourly rate changed from {} to {new_rate}", self.hourly_rate);
        self.hourly_rate = new_rate;
        Ok(())
    }

    /// Operator override of the barrier state. Has no effect on bookkeeping.
    pub fn set_gate_status(&mut self, status: GateStatus) {
        if self.gate_status != status {
            info!("gate {status}");
        }
        self.gate_status = status;
    }
}
