use std::time::Duration;

use parking_lot::Mutex;
use script_launcher::logsink::{Level, LogSink, SinkFuture};
use script_launcher::types::ScriptId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub script_id: ScriptId,
    pub script_name: String,
    pub level: Level,
    pub message: String,
}

/// In-memory `LogSink` that keeps every line it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<Recorded>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<Recorded> {
        self.lines.lock().clone()
    }

    /// Messages of one level for one script, in order.
    pub fn messages(&self, script_id: ScriptId, level: Level) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|l| l.script_id == script_id && l.level == level)
            .map(|l| l.message.clone())
            .collect()
    }

    pub fn contains(&self, script_id: ScriptId, needle: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|l| l.script_id == script_id && l.message.contains(needle))
    }

    /// Poll until a matching line shows up or `timeout` elapses.
    pub async fn wait_for(&self, script_id: ScriptId, needle: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.contains(script_id, needle) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl LogSink for RecordingSink {
    fn write<'a>(
        &'a self,
        script_id: ScriptId,
        script_name: &'a str,
        level: Level,
        message: &'a str,
    ) -> SinkFuture<'a> {
        self.lines.lock().push(Recorded {
            script_id,
            script_name: script_name.to_string(),
            level,
            message: message.to_string(),
        });
        Box::pin(async { Ok(()) })
    }
}
