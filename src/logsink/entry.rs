// src/logsink/entry.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::types::ScriptId;

/// Level of a script log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Stdout,
    Stderr,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Stdout => "STDOUT",
            Level::Stderr => "STDERR",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Level::Info),
            "STDOUT" => Ok(Level::Stdout),
            "STDERR" => Ok(Level::Stderr),
            "ERROR" => Ok(Level::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// One line of a script log.
///
/// The script id is not part of the on-disk format, so entries read back from
/// a file carry `script_id = None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub script_id: Option<ScriptId>,
    pub script_name: String,
    pub level: Level,
    pub message: String,
}

impl LogEntry {
    pub fn new(script_id: ScriptId, script_name: &str, level: Level, message: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            script_id: Some(script_id),
            script_name: script_name.to_string(),
            level,
            // A line is a line: embedded newlines would split the record.
            message: message.replace(['\r', '\n'], " "),
        }
    }

    /// `ISO8601-millis|scriptName|LEVEL|message`
    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.script_name,
            self.level,
            self.message
        )
    }

    /// Parse a line written by [`LogEntry::to_line`]. The message is
    /// everything after the third `|`.
    pub fn from_line(line: &str) -> Option<Self> {
        let mut parts = line.trim_end_matches(['\r', '\n']).splitn(4, '|');
        let timestamp = parts.next()?;
        let script_name = parts.next()?;
        let level = parts.next()?;
        let message = parts.next()?;

        let timestamp = DateTime::parse_from_rfc3339(timestamp).ok()?.with_timezone(&Utc);
        let level = level.parse().ok()?;

        Some(Self {
            timestamp,
            script_id: None,
            script_name: script_name.to_string(),
            level,
            message: message.to_string(),
        })
    }

    pub fn notification(&self) -> LogNotification {
        LogNotification {
            kind: "log",
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            script_id: self.script_id,
            script_name: self.script_name.clone(),
            level: self.level,
            message: self.message.clone(),
        }
    }
}

/// Payload pushed to live subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogNotification {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: String,
    pub script_id: Option<ScriptId>,
    pub script_name: String,
    pub level: Level,
    pub message: String,
}

impl LogNotification {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
