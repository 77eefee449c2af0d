//! Job triggers: cron expressions and fixed intervals.
//!
//! Cron expressions are evaluated in UTC. Five-field expressions
//! (minute first) are accepted and normalized to the six-field form
//! the `cron` crate expects.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use certwatch_core::error::{CertwatchError, Result};

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Accept both 5-field (standard cron) and 6-field (with seconds)
/// expressions by prepending a seconds field when missing.
pub fn normalize_cron(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobTrigger {
    Cron { expression: String },
    Interval { every_secs: u64 },
}

impl JobTrigger {
    /// Validated cron trigger. The stored expression is normalized.
    pub fn cron(expr: &str) -> Result<Self> {
        let normalized = normalize_cron(expr);
        Schedule::from_str(&normalized)
            .map_err(|err| CertwatchError::InvalidSchedule(format!("{expr:?}: {err}")))?;
        Ok(Self::Cron {
            expression: normalized,
        })
    }

    /// Weekly trigger at `HH:MM` UTC on the given weekday, 0 = Sunday.
    pub fn weekly(day: u8, time: &str) -> Result<Self> {
        let day_name = WEEKDAYS
            .get(day as usize)
            .ok_or_else(|| CertwatchError::InvalidSchedule(format!("weekday {day} out of range")))?;
        let (hour, minute) = time
            .split_once(':')
            .ok_or_else(|| CertwatchError::InvalidSchedule(format!("time {time:?} is not HH:MM")))?;
        let hour: u8 = hour
            .parse()
            .map_err(|_| CertwatchError::InvalidSchedule(format!("bad hour in {time:?}")))?;
        let minute: u8 = minute
            .parse()
            .map_err(|_| CertwatchError::InvalidSchedule(format!("bad minute in {time:?}")))?;
        if hour > 23 || minute > 59 {
            return Err(CertwatchError::InvalidSchedule(format!(
                "time {time:?} out of range"
            )));
        }
        Self::cron(&format!("0 {minute} {hour} * * {day_name}"))
    }

    pub fn interval_secs(every_secs: u64) -> Result<Self> {
        if every_secs == 0 {
            return Err(CertwatchError::InvalidSchedule(
                "interval must be at least one second".to_string(),
            ));
        }
        Ok(Self::Interval { every_secs })
    }

    /// Next fire time strictly after `after`. Intervals count from
    /// `after`, so a skipped or finished run pushes the next one a full
    /// period out rather than coalescing missed runs.
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { expression } => Schedule::from_str(expression)
                .ok()?
                .after(&after)
                .next(),
            Self::Interval { every_secs } => {
                Some(after + chrono::Duration::seconds(*every_secs as i64))
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Cron { expression } => format!("cron[{expression}]"),
            Self::Interval { every_secs } => format!("interval[{every_secs}s]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normalizes_five_field_expressions() {
        assert_eq!(normalize_cron("0 9 * * MON"), "0 0 9 * * MON");
        assert_eq!(normalize_cron("0 0 9 * * MON"), "0 0 9 * * MON");
    }

    #[test]
    fn weekly_trigger_fires_on_requested_weekday() {
        let trigger = JobTrigger::weekly(1, "09:00").unwrap();
        // 2025-06-02 is a Monday.
        let after = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let next = trigger.next_run_after(after).unwrap();
        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn weekly_rejects_bad_inputs() {
        assert!(JobTrigger::weekly(7, "09:00").is_err());
        assert!(JobTrigger::weekly(1, "25:00").is_err());
        assert!(JobTrigger::weekly(1, "0900").is_err());
        assert!(JobTrigger::weekly(1, "09:xx").is_err());
    }

    #[test]
    fn cron_rejects_malformed_expressions() {
        assert!(JobTrigger::cron("not a cron").is_err());
        assert!(JobTrigger::cron("0 9 * * MON").is_ok());
    }

    #[test]
    fn interval_counts_from_reference_point() {
        let trigger = JobTrigger::interval_secs(3600).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(
            trigger.next_run_after(after).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap()
        );
        assert!(JobTrigger::interval_secs(0).is_err());
    }
}
