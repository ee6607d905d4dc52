#![allow(dead_code)]

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, Utc};
use script_launcher::script::ScriptConfig;
use script_launcher::types::{IntervalUnit, ScheduledAt, ScriptId, WeekdayFilter};

/// Builder for `ScriptConfig`. Starts active and unscheduled.
pub struct ScriptConfigBuilder {
    config: ScriptConfig,
}

impl ScriptConfigBuilder {
    pub fn new(id: ScriptId, name: &str) -> Self {
        Self {
            config: ScriptConfig::new(id, name, format!("{name}.sh")),
        }
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.path = path.as_ref().display().to_string();
        self
    }

    pub fn inactive(mut self) -> Self {
        self.config.is_active = false;
        self
    }

    pub fn every(mut self, value: u32, unit: IntervalUnit) -> Self {
        self.config.repeat_enabled = true;
        self.config.interval_value = Some(value);
        self.config.interval_unit = Some(unit);
        self
    }

    pub fn weekdays(mut self, days: &[i64]) -> Self {
        self.config.weekdays = WeekdayFilter::try_from_days(days).expect("valid weekdays");
        self
    }

    /// One-shot start at a naive local timestamp.
    pub fn start_at_local(mut self, at: NaiveDateTime) -> Self {
        self.config.scheduled_start_enabled = true;
        self.config.scheduled_start_at = Some(ScheduledAt::Local(at));
        self
    }

    /// One-shot start at an absolute instant.
    pub fn start_at(mut self, at: DateTime<Utc>) -> Self {
        self.config.scheduled_start_enabled = true;
        self.config.scheduled_start_at = Some(ScheduledAt::Zoned(at.fixed_offset()));
        self
    }

    /// One-shot start `offset` away from the local wall clock of `now`,
    /// stored without a zone.
    pub fn start_in_local(self, now: DateTime<Utc>, offset: TimeDelta) -> Self {
        let at = now.with_timezone(&Local).naive_local() + offset;
        self.start_at_local(at)
    }

    pub fn build(self) -> ScriptConfig {
        self.config
    }
}

/// Write an executable shell script into `dir` and return its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path).expect("stat script").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).expect("chmod script");
    }
    path
}
