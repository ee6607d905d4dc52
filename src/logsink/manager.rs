// src/logsink/manager.rs

//! File-backed log sink with live fan-out.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::errors::Result;
use crate::logsink::{Level, LogEntry, LogNotification, LogSink, SinkFuture};
use crate::types::ScriptId;

/// Default per-subscriber buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 100;

struct Subscriber {
    filter: Option<ScriptId>,
    tx: mpsc::Sender<LogNotification>,
}

/// Writes one log file per day (`<logs_dir>/<YYYY-MM-DD>.log`) and pushes
/// every entry to live subscribers.
///
/// Subscribers have a bounded buffer. A subscriber that falls behind loses
/// messages; producers never wait on it.
pub struct LogManager {
    logs_dir: PathBuf,
    subscriber_buffer: usize,
    // Serialises appends so concurrent writers never interleave lines.
    write_lock: tokio::sync::Mutex<()>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl LogManager {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_buffer(logs_dir, DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn with_buffer(logs_dir: impl Into<PathBuf>, subscriber_buffer: usize) -> Result<Self> {
        let logs_dir = logs_dir.into();
        std::fs::create_dir_all(&logs_dir)?;
        Ok(Self {
            logs_dir,
            subscriber_buffer: subscriber_buffer.max(1),
            write_lock: tokio::sync::Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    fn log_file(&self, date: NaiveDate) -> PathBuf {
        self.logs_dir.join(format!("{}.log", date.format("%Y-%m-%d")))
    }

    /// Register a live subscriber, optionally restricted to one script.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&self, filter: Option<ScriptId>) -> mpsc::Receiver<LogNotification> {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        self.subscribers.lock().push(Subscriber { filter, tx });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn broadcast(&self, entry: &LogEntry) {
        let notification = entry.notification();
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| {
            if sub.filter.is_some() && sub.filter != entry.script_id {
                return !sub.tx.is_closed();
            }
            match sub.tx.try_send(notification.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    trace!("log subscriber buffer full; dropping message");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
    }

    async fn append(&self, entry: &LogEntry) -> Result<()> {
        let path = self.log_file(Local::now().date_naive());
        let mut line = entry.to_line();
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read the entries of one day (today if `date` is `None`), optionally
    /// filtered by script name. Malformed lines are skipped.
    pub async fn read_logs(
        &self,
        date: Option<NaiveDate>,
        script_name: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        let date = date.unwrap_or_else(|| Local::now().date_naive());
        let contents = match tokio::fs::read_to_string(self.log_file(date)).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(contents
            .lines()
            .filter_map(LogEntry::from_line)
            .filter(|entry| script_name.is_none_or(|name| entry.script_name == name))
            .collect())
    }

    /// Dates that have a log file, newest first.
    pub async fn available_dates(&self) -> Result<Vec<NaiveDate>> {
        let mut dates = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.logs_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(dates),
            Err(e) => return Err(e.into()),
        };

        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_none_or(|ext| ext != "log") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match NaiveDate::parse_from_str(stem, "%Y-%m-%d") {
                Ok(date) => dates.push(date),
                Err(_) => debug!(?path, "ignoring non-date file in logs dir"),
            }
        }

        dates.sort_unstable_by(|a, b| b.cmp(a));
        Ok(dates)
    }
}

impl LogSink for LogManager {
    fn write<'a>(
        &'a self,
        script_id: ScriptId,
        script_name: &'a str,
        level: Level,
        message: &'a str,
    ) -> SinkFuture<'a> {
        Box::pin(async move {
            let entry = LogEntry::new(script_id, script_name, level, message);
            self.append(&entry).await?;
            self.broadcast(&entry);
            Ok(())
        })
    }
}
