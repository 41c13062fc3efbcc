use chrono::{Days, NaiveDate};

use crate::config::ConfigStore;
use crate::model::*;

use super::Engine;

impl Engine {
    pub fn get_status(&self) -> ParkingStatus {
        ParkingStatus {
            total_spaces: self.total_spaces,
            available_spaces: self.available_spaces(),
            gate_status: self.gate_status,
        }
    }

    pub fn total_spaces(&self) -> u32 {
        self.total_spaces
    }

    /// `total − open`, never below zero.
    pub fn available_spaces(&self) -> u32 {
        self.total_spaces.saturating_sub(self.occupied)
    }

    pub fn hourly_rate(&self) -> f64 {
        self.hourly_rate
    }

    pub fn gate_status(&self) -> GateStatus {
        self.gate_status
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// The full ledger, open and closed, in entry order.
    pub fn records(&self) -> &[Visit] {
        &self.visits
    }

    pub fn is_parked(&self, plate: &str) -> bool {
        self.visits
            .iter()
            .any(|v| v.is_open() && v.license_plate == plate)
    }

    /// Vehicles currently parked, in entry order.
    pub fn get_current_vehicles(&self) -> Vec<Visit> {
        self.visits.iter().filter(|v| v.is_open()).cloned().collect()
    }

    /// Visits that entered on `date`.
    pub fn get_records_by_date(&self, date: NaiveDate) -> Vec<Visit> {
        self.visits
            .iter()
            .filter(|v| v.entry_date() == date)
            .cloned()
            .collect()
    }

    /// Visits that entered on any calendar day in `[start, end]`, optionally
    /// for one plate only.
    pub fn get_records_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        plate: Option<&str>,
    ) -> Vec<Visit> {
        let from = start.and_time(chrono::NaiveTime::MIN);
        // Exclusive upper bound: midnight after `end`
        let until = end
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(chrono::NaiveTime::MIN));
        let plate = plate.map(str::trim).filter(|p| !p.is_empty());

        self.visits
            .iter()
            .filter(|v| v.entry_time >= from)
            .filter(|v| until.is_none_or(|u| v.entry_time < u))
            .filter(|v| plate.is_none_or(|p| v.license_plate == p))
            .cloned()
            .collect()
    }

    /// Totals for a report over the given visits.
    pub fn summarize(&self, visits: &[Visit]) -> ReportSummary {
        ReportSummary::from_visits(visits)
    }
}
