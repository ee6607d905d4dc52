// src/types.rs

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{LauncherError, Result};

/// Stable identifier of a script record in the record store.
pub type ScriptId = i64;

/// Unit of a recurring interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl IntervalUnit {
    pub fn duration(self, value: u32) -> Duration {
        let secs = u64::from(value);
        match self {
            IntervalUnit::Seconds => Duration::from_secs(secs),
            IntervalUnit::Minutes => Duration::from_secs(secs * 60),
            IntervalUnit::Hours => Duration::from_secs(secs * 60 * 60),
            IntervalUnit::Days => Duration::from_secs(secs * 60 * 60 * 24),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntervalUnit::Seconds => "seconds",
            IntervalUnit::Minutes => "minutes",
            IntervalUnit::Hours => "hours",
            IntervalUnit::Days => "days",
        }
    }
}

impl FromStr for IntervalUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "seconds" => Ok(IntervalUnit::Seconds),
            "minutes" => Ok(IntervalUnit::Minutes),
            "hours" => Ok(IntervalUnit::Hours),
            "days" => Ok(IntervalUnit::Days),
            other => Err(format!(
                "invalid interval_unit: {other} (expected seconds, minutes, hours or days)"
            )),
        }
    }
}

/// What caused an execution to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Scheduled,
    ScheduledStart,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
            Trigger::ScheduledStart => "scheduled_start",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an execution. `Running` transitions exactly once to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Days of the week (Monday = 0) on which recurring runs may fire.
///
/// An empty filter means "every day".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WeekdayFilter {
    days: BTreeSet<u8>,
}

impl WeekdayFilter {
    pub fn every_day() -> Self {
        Self::default()
    }

    /// Build a filter from user-supplied day numbers, rejecting anything
    /// outside `0..=6`.
    pub fn try_from_days(days: &[i64]) -> Result<Self> {
        let mut set = BTreeSet::new();
        for &day in days {
            let day = u8::try_from(day)
                .ok()
                .filter(|d| *d <= 6)
                .ok_or_else(|| {
                    LauncherError::ConfigInvalid(format!(
                        "weekday {day} out of range (expected 0=Monday ... 6=Sunday)"
                    ))
                })?;
            set.insert(day);
        }
        Ok(Self { days: set })
    }

    /// Parse weekday data as persisted by a record store (a JSON array).
    ///
    /// Malformed data is not an error: it yields "every day".
    pub fn from_persisted(raw: &str) -> Self {
        let parsed = serde_json::from_str::<Vec<i64>>(raw)
            .ok()
            .and_then(|days| Self::try_from_days(&days).ok());
        match parsed {
            Some(filter) => filter,
            None => {
                warn!(weekdays = %raw, "malformed weekday data; running every day");
                Self::every_day()
            }
        }
    }

    pub fn is_every_day(&self) -> bool {
        self.days.is_empty()
    }

    pub fn allows(&self, weekday: Weekday) -> bool {
        self.is_every_day() || self.days.contains(&weekday_index(weekday))
    }

    pub fn days(&self) -> impl Iterator<Item = u8> + '_ {
        self.days.iter().copied()
    }
}

/// Monday = 0 ... Sunday = 6.
pub fn weekday_index(weekday: Weekday) -> u8 {
    // num_days_from_monday is 0..=6
    weekday.num_days_from_monday() as u8
}

/// A one-shot start time.
///
/// A timestamp without an explicit zone is wall-clock time on this host; one
/// with an explicit offset is an absolute instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledAt {
    Local(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

impl ScheduledAt {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(ScheduledAt::Zoned(dt));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
            .map(ScheduledAt::Local)
            .ok_or_else(|| {
                LauncherError::ConfigInvalid(format!("invalid scheduled_start_at timestamp: {s}"))
            })
    }

    /// Naive timestamps compare against local wall-clock time, zoned ones
    /// against UTC.
    pub fn is_after(&self, now: DateTime<Utc>) -> bool {
        match self {
            ScheduledAt::Local(naive) => *naive > now.with_timezone(&Local).naive_local(),
            ScheduledAt::Zoned(at) => at.with_timezone(&Utc) > now,
        }
    }

    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        !self.is_after(now)
    }

    /// Time left until this instant, saturating at zero for past instants.
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        let delta = match self {
            ScheduledAt::Local(naive) => *naive - now.with_timezone(&Local).naive_local(),
            ScheduledAt::Zoned(at) => at.with_timezone(&Utc) - now,
        };
        delta.to_std().unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for ScheduledAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduledAt::Local(naive) => write!(f, "{}", naive.format("%Y-%m-%dT%H:%M:%S")),
            ScheduledAt::Zoned(at) => f.write_str(&at.to_rfc3339()),
        }
    }
}

impl FromStr for ScheduledAt {
    type Err = LauncherError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ScheduledAt::parse(s)
    }
}

impl Serialize for ScheduledAt {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
