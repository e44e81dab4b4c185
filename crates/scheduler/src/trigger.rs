//! Job triggers: cron expressions, fixed intervals and one-shot dates.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::SchedulerError;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate wants `sec min hour day-of-month month day-of-week`;
/// configuration uses the standard 5-field form.
pub(crate) fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Parse a 5- or 6-field cron expression, evaluated in UTC.
pub fn parse_cron(expr: &str) -> Result<Schedule, SchedulerError> {
    let normalized = normalize_cron(expr);
    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone)]
pub enum Trigger {
    Cron { expr: String, schedule: Schedule },
    Interval(Duration),
    Once(DateTime<Utc>),
}

impl Trigger {
    pub fn cron(expr: &str) -> Result<Self, SchedulerError> {
        Ok(Self::Cron {
            expr: expr.trim().to_string(),
            schedule: parse_cron(expr)?,
        })
    }

    pub fn interval(period: Duration) -> Self {
        Self::Interval(period)
    }

    pub fn once(at: DateTime<Utc>) -> Self {
        Self::Once(at)
    }

    /// When a freshly added job first fires.
    pub fn first_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedule, .. } => schedule.after(&now).next(),
            Self::Interval(period) => add_std(now, *period),
            Self::Once(at) => Some(*at),
        }
    }

    /// Next fire time after a run scheduled for `scheduled` fired at `now`.
    ///
    /// Interval triggers keep their cadence and skip missed slots instead of
    /// firing them back to back. One-shot triggers are exhausted.
    pub fn next_fire(&self, scheduled: DateTime<Utc>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Cron { schedule, .. } => schedule.after(&now).next(),
            Self::Interval(period) => {
                let next = add_std(scheduled, *period)?;
                if next > now {
                    Some(next)
                } else {
                    add_std(now, *period)
                }
            }
            Self::Once(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Cron { expr, .. } => format!("cron '{}' UTC", expr),
            Self::Interval(period) => format!("every {}s", period.as_secs()),
            Self::Once(at) => format!("once at {}", at.to_rfc3339()),
        }
    }
}

fn add_std(at: DateTime<Utc>, period: Duration) -> Option<DateTime<Utc>> {
    let delta = chrono::Duration::from_std(period).ok()?;
    at.checked_add_signed(delta)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    #[test]
    fn normalizes_five_field_expressions() {
        assert_eq!(normalize_cron("0 0 * * *"), "0 0 0 * * *");
        assert_eq!(normalize_cron("  */5 * * * *  "), "0 */5 * * * *");
        assert_eq!(normalize_cron("30 0 1 * * *"), "30 0 1 * * *");
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_cron("every day please").unwrap_err();
        match err {
            SchedulerError::InvalidCron { expr, .. } => assert_eq!(expr, "every day please"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn daily_cron_fires_at_midnight_utc() {
        let trigger = Trigger::cron("0 0 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 42, 7).unwrap();
        let next = trigger.first_fire(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());

        let review = Trigger::cron("0 1 * * *").unwrap();
        let next = review.first_fire(now).unwrap();
        assert_eq!((next.hour(), next.minute()), (1, 0));
    }

    #[test]
    fn interval_skips_missed_slots() {
        let trigger = Trigger::interval(Duration::from_secs(600));
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let first = trigger.first_fire(start).unwrap();
        assert_eq!(first, start + chrono::Duration::minutes(10));

        // On time: cadence is kept.
        let next = trigger.next_fire(first, first).unwrap();
        assert_eq!(next, start + chrono::Duration::minutes(20));

        // Fired 25 minutes late: the missed slot is not replayed.
        let late = first + chrono::Duration::minutes(25);
        let next = trigger.next_fire(first, late).unwrap();
        assert_eq!(next, late + chrono::Duration::minutes(10));
    }

    #[test]
    fn once_is_exhausted_after_firing() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let trigger = Trigger::once(at);
        assert_eq!(trigger.first_fire(at - chrono::Duration::hours(1)), Some(at));
        assert_eq!(trigger.next_fire(at, at), None);
    }
}
