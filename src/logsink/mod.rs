// src/logsink/mod.rs

//! Script log sink.
//!
//! Script output and execution lifecycle messages are data, not diagnostics:
//! they go through a [`LogSink`] into daily log files and out to live
//! subscribers. Operator diagnostics keep using `tracing`.
//!
//! - [`entry`] defines the line format and the live notification shape.
//! - [`manager`] is the file-backed implementation with fan-out.

use std::future::Future;
use std::pin::Pin;

use tracing::warn;

use crate::errors::Result;
use crate::types::ScriptId;

pub mod entry;
pub mod manager;

pub use entry::{Level, LogEntry, LogNotification};
pub use manager::LogManager;

/// Boxed future returned by [`LogSink::write`].
pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Destination for script log lines.
pub trait LogSink: Send + Sync {
    /// Append one line and notify live subscribers.
    fn write<'a>(
        &'a self,
        script_id: ScriptId,
        script_name: &'a str,
        level: Level,
        message: &'a str,
    ) -> SinkFuture<'a>;
}

/// Write to the sink, reporting (but otherwise ignoring) failures.
///
/// A broken log sink must never abort a run or a timer callback.
pub async fn emit(sink: &dyn LogSink, script_id: ScriptId, script_name: &str, level: Level, message: &str) {
    if let Err(e) = sink.write(script_id, script_name, level, message).await {
        warn!(
            script_id,
            script = %script_name,
            level = level.as_str(),
            error = %e,
            "failed to write script log line"
        );
    }
}
