use crate::model::Timestamp;

const MICROS_PER_HOUR: i64 = 3_600_000_000;

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Whole hours billed for a stay: any partial hour counts as a full one,
/// and every visit bills at least one hour. Negative durations bill the minimum.
pub fn billable_hours(entry: Timestamp, exit: Timestamp) -> i64 {
    let micros = (exit - entry).num_microseconds().unwrap_or(i64::MAX);
    if micros <= 0 {
        return 1;
    }
    let hours = micros / MICROS_PER_HOUR + i64::from(micros % MICROS_PER_HOUR != 0);
    hours.max(1)
}

/// `ceil(hours) × rate`, rounded to cents.
pub fn compute_fee(entry: Timestamp, exit: Timestamp, hourly_rate: f64) -> f64 {
    round2(billable_hours(entry, exit) as f64 * hourly_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn t0() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn partial_hour_rounds_up() {
        assert_eq!(compute_fee(t0(), t0() + Duration::minutes(61), 5.0), 10.0);
        assert_eq!(compute_fee(t0(), t0() + Duration::minutes(1), 5.0), 5.0);
        assert_eq!(compute_fee(t0(), t0() + Duration::microseconds(3_600_000_001), 5.0), 10.0);
    }

    #[test]
    fn exact_hours_not_rounded_up() {
        assert_eq!(billable_hours(t0(), t0() + Duration::hours(1)), 1);
        assert_eq!(billable_hours(t0(), t0() + Duration::hours(3)), 3);
    }

    #[test]
    fn zero_duration_bills_one_hour() {
        assert_eq!(compute_fee(t0(), t0(), 5.0), 5.0);
    }

    #[test]
    fn negative_duration_bills_minimum() {
        assert_eq!(billable_hours(t0(), t0() - Duration::minutes(30)), 1);
        assert_eq!(compute_fee(t0(), t0() - Duration::hours(5), 4.0), 4.0);
    }

    #[test]
    fn fee_rounded_to_cents() {
        assert_eq!(compute_fee(t0(), t0() + Duration::hours(3), 3.333), 10.0);
        assert_eq!(compute_fee(t0(), t0() + Duration::hours(1), 2.346), 2.35);
    }

    #[test]
    fn multi_day_stay() {
        let exit = t0() + Duration::days(2) + Duration::minutes(5);
        assert_eq!(billable_hours(t0(), exit), 49);
    }
}
