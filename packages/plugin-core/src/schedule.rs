use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a schedule's value string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    /// Five-field cron expression.
    Cron,
    /// Whole number of minutes between runs.
    Interval,
    /// One or more comma-separated `HH:MM` times per day.
    Daily,
    /// `DAY:HH:MM` with a three-letter day abbreviation.
    Weekly,
}

impl ScheduleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleKind::Cron => "cron",
            ScheduleKind::Interval => "interval",
            ScheduleKind::Daily => "daily",
            ScheduleKind::Weekly => "weekly",
        }
    }
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleKind {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cron" => Ok(ScheduleKind::Cron),
            "interval" => Ok(ScheduleKind::Interval),
            "daily" => Ok(ScheduleKind::Daily),
            "weekly" => Ok(ScheduleKind::Weekly),
            other => Err(ScheduleError::UnknownKind(other.to_string())),
        }
    }
}

/// A schedule declaration: kind plus its kind-specific value encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    pub value: String,
}

impl ScheduleSpec {
    pub fn new(kind: ScheduleKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Unknown schedule type '{0}'")]
    UnknownKind(String),

    #[error("Invalid cron expression '{value}': {detail}")]
    InvalidCron { value: String, detail: String },

    #[error("Invalid time token '{0}', expected HH:MM")]
    InvalidTime(String),
}

/// Fallback applied by callers when a schedule value cannot be interpreted.
/// One bad row degrades to a daily retry instead of halting the calculator.
pub fn fallback_next_run(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(1)
}

/// Compute the next occurrence strictly after `now`.
///
/// Pure function over plain data; persistence and fallback policy live with
/// the caller. `Err` means the value could not be interpreted, and the caller
/// is expected to log a warning and use [`fallback_next_run`].
pub fn next_run(
    kind: ScheduleKind,
    value: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    match kind {
        ScheduleKind::Cron => next_cron_run(value, now),
        ScheduleKind::Interval => Ok(next_interval_run(value, now)),
        ScheduleKind::Daily => next_daily_run(value, now),
        ScheduleKind::Weekly => next_weekly_run(value, now),
    }
}

fn next_cron_run(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    // The cron crate expects a seconds field; schedule values use the
    // classic five-field form, so anchor them at second zero.
    let expression = if value.split_whitespace().count() == 5 {
        format!("0 {value}")
    } else {
        value.to_string()
    };

    let schedule = cron::Schedule::from_str(&expression).map_err(|e| ScheduleError::InvalidCron {
        value: value.to_string(),
        detail: e.to_string(),
    })?;

    schedule
        .after(&now)
        .next()
        .ok_or_else(|| ScheduleError::InvalidCron {
            value: value.to_string(),
            detail: "no upcoming occurrence".to_string(),
        })
}

/// Interval in minutes, clamped to at least one minute so a zero or negative
/// value cannot busy-loop the sweep. Unparsable values coerce to the clamp.
fn next_interval_run(value: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let minutes: i64 = value.trim().parse().unwrap_or(0);
    now + Duration::minutes(minutes.max(1))
}

fn next_daily_run(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let mut earliest: Option<DateTime<Utc>> = None;

    for token in value.split(',') {
        let time = parse_hh_mm(token.trim())?;
        let mut candidate = now
            .date_naive()
            .and_time(time)
            .and_utc();

        if candidate <= now {
            candidate += Duration::days(1);
        }

        earliest = Some(match earliest {
            Some(current) => current.min(candidate),
            None => candidate,
        });
    }

    earliest.ok_or_else(|| ScheduleError::InvalidTime(value.to_string()))
}

/// `DAY:HH:MM` with an unrecognized or missing day defaulting to Monday,
/// and missing time parts defaulting to 09:00.
fn next_weekly_run(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let mut parts = value.split(':');

    let target = parts
        .next()
        .map(parse_weekday)
        .unwrap_or(Weekday::Mon);
    let hour: u32 = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(9);
    let minute: u32 = parts.next().and_then(|p| p.trim().parse().ok()).unwrap_or(0);

    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| ScheduleError::InvalidTime(value.to_string()))?;

    let mut candidate = now.date_naive().and_time(time).and_utc();
    while candidate.weekday() != target || candidate <= now {
        candidate += Duration::days(1);
    }

    Ok(candidate)
}

fn parse_weekday(token: &str) -> Weekday {
    match token.trim().to_ascii_uppercase().as_str() {
        "SUN" => Weekday::Sun,
        "MON" => Weekday::Mon,
        "TUE" => Weekday::Tue,
        "WED" => Weekday::Wed,
        "THU" => Weekday::Thu,
        "FRI" => Weekday::Fri,
        "SAT" => Weekday::Sat,
        _ => Weekday::Mon,
    }
}

fn parse_hh_mm(token: &str) -> Result<NaiveTime, ScheduleError> {
    let invalid = || ScheduleError::InvalidTime(token.to_string());

    let (hour, minute) = token.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}
