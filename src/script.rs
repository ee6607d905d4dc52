// src/script.rs

//! Script records as seen by the engine.
//!
//! The record store owns these; the engine reads them and only ever writes
//! `is_active` on its own initiative.

use std::time::Duration;

use serde::Serialize;

use crate::errors::{LauncherError, Result};
use crate::types::{IntervalUnit, ScheduledAt, ScriptId, WeekdayFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptConfig {
    pub id: ScriptId,
    pub name: String,
    pub path: String,
    pub description: Option<String>,
    pub is_active: bool,

    pub repeat_enabled: bool,
    pub interval_value: Option<u32>,
    pub interval_unit: Option<IntervalUnit>,
    pub weekdays: WeekdayFilter,

    pub scheduled_start_enabled: bool,
    pub scheduled_start_at: Option<ScheduledAt>,
}

impl ScriptConfig {
    /// A new, active script with no schedule.
    pub fn new(id: ScriptId, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            path: path.into(),
            description: None,
            is_active: true,
            repeat_enabled: false,
            interval_value: None,
            interval_unit: None,
            weekdays: WeekdayFilter::every_day(),
            scheduled_start_enabled: false,
            scheduled_start_at: None,
        }
    }

    /// Interval of the recurring schedule, if the schedule is eligible to run.
    pub fn recurring_interval(&self) -> Option<Duration> {
        if !self.repeat_enabled {
            return None;
        }
        match (self.interval_value, self.interval_unit) {
            (Some(value), Some(unit)) if value >= 1 => Some(unit.duration(value)),
            _ => None,
        }
    }

    /// Start time of the one-shot schedule, if the schedule is eligible.
    pub fn one_shot_at(&self) -> Option<ScheduledAt> {
        if self.scheduled_start_enabled {
            self.scheduled_start_at
        } else {
            None
        }
    }

    /// Human-readable interval, e.g. `"30 seconds"`.
    pub fn interval_label(&self) -> String {
        match (self.interval_value, self.interval_unit) {
            (Some(value), Some(unit)) => format!("{value} {}", unit.as_str()),
            _ => "no interval".to_string(),
        }
    }

    /// Check that the schedule fields are consistent with each other.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(LauncherError::ConfigInvalid(format!(
                "script {} has an empty name",
                self.id
            )));
        }
        if self.path.trim().is_empty() {
            return Err(LauncherError::ConfigInvalid(format!(
                "script '{}' has an empty path",
                self.name
            )));
        }
        if let Some(0) = self.interval_value {
            return Err(LauncherError::ConfigInvalid(format!(
                "script '{}': interval_value must be >= 1 (got 0)",
                self.name
            )));
        }
        if self.repeat_enabled && (self.interval_value.is_none() || self.interval_unit.is_none()) {
            return Err(LauncherError::ConfigInvalid(format!(
                "script '{}': repeat_enabled requires both interval_value and interval_unit",
                self.name
            )));
        }
        Ok(())
    }
}

/// Partial update of a script record. `None` leaves a field untouched.
///
/// Nullable fields use a nested `Option` so they can be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptPatch {
    pub name: Option<String>,
    pub path: Option<String>,
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub repeat_enabled: Option<bool>,
    pub interval_value: Option<Option<u32>>,
    pub interval_unit: Option<Option<IntervalUnit>>,
    pub weekdays: Option<WeekdayFilter>,
    pub scheduled_start_enabled: Option<bool>,
    pub scheduled_start_at: Option<Option<ScheduledAt>>,
}

impl ScriptPatch {
    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Self::default()
        }
    }

    pub fn apply(self, config: &mut ScriptConfig) {
        if let Some(name) = self.name {
            config.name = name;
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(description) = self.description {
            config.description = description;
        }
        if let Some(is_active) = self.is_active {
            config.is_active = is_active;
        }
        if let Some(repeat_enabled) = self.repeat_enabled {
            config.repeat_enabled = repeat_enabled;
        }
        if let Some(interval_value) = self.interval_value {
            config.interval_value = interval_value;
        }
        if let Some(interval_unit) = self.interval_unit {
            config.interval_unit = interval_unit;
        }
        if let Some(weekdays) = self.weekdays {
            config.weekdays = weekdays;
        }
        if let Some(enabled) = self.scheduled_start_enabled {
            config.scheduled_start_enabled = enabled;
        }
        if let Some(at) = self.scheduled_start_at {
            config.scheduled_start_at = at;
        }
    }
}
