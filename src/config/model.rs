// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::RunnerOptions;
use crate::logsink::manager::DEFAULT_SUBSCRIBER_BUFFER;
use crate::schedule::SchedulerOptions;
use crate::script::ScriptConfig;
use crate::types::IntervalUnit;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [engine]
/// logs_dir = "logs"
/// interpreter = "python3"
///
/// [script.backup]
/// id = 1
/// path = "scripts/backup.py"
/// repeat_enabled = true
/// interval_value = 6
/// interval_unit = "hours"
/// weekdays = [0, 1, 2, 3, 4]
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    /// Script definitions from `[script.<name>]`, keyed by script name.
    #[serde(default)]
    pub script: BTreeMap<String, RawScriptConfig>,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Directory holding the daily script log files.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,

    /// Program used to run script paths; an empty string executes the path
    /// directly.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Seconds between SIGTERM and SIGKILL when stopping a run.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,

    /// Upper bound on how long shutdown waits for in-flight runs.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Per-subscriber buffer of live log notifications.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_stop_grace_secs() -> u64 {
    5
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            logs_dir: default_logs_dir(),
            interpreter: default_interpreter(),
            stop_grace_secs: default_stop_grace_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl EngineSection {
    pub fn interpreter(&self) -> Option<String> {
        let trimmed = self.interpreter.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            interpreter: self.interpreter(),
            grace_period: Duration::from_secs(self.stop_grace_secs),
        }
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}

/// Weekday data: a list of day numbers, or a JSON string as persisted by
/// record stores that keep weekdays in a text column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawWeekdays {
    List(Vec<i64>),
    Persisted(String),
}

/// `[script.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawScriptConfig {
    /// Stable id. Scripts without one get the next free id, in name order.
    #[serde(default)]
    pub id: Option<i64>,

    pub path: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_is_active")]
    pub is_active: bool,

    #[serde(default)]
    pub repeat_enabled: bool,

    #[serde(default)]
    pub interval_value: Option<i64>,

    #[serde(default)]
    pub interval_unit: Option<IntervalUnit>,

    #[serde(default)]
    pub weekdays: Option<RawWeekdays>,

    #[serde(default)]
    pub scheduled_start_enabled: bool,

    /// RFC 3339 with an offset, or a naive local timestamp.
    #[serde(default)]
    pub scheduled_start_at: Option<String>,
}

fn default_is_active() -> bool {
    true
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>`, so holding one means
/// every script passed validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub engine: EngineSection,
    /// Scripts ordered by id.
    pub scripts: Vec<ScriptConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(engine: EngineSection, scripts: Vec<ScriptConfig>) -> Self {
        Self { engine, scripts }
    }

    pub fn script_by_name(&self, name: &str) -> Option<&ScriptConfig> {
        self.scripts.iter().find(|s| s.name == name)
    }
}
