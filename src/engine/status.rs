// src/engine/status.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::exec::ExecutionId;
use crate::types::ScriptId;

/// Point-in-time view of one script: record state, running execution and
/// installed timers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptStatus {
    pub script_id: ScriptId,
    pub is_active: bool,
    pub is_running: bool,
    pub execution_id: Option<ExecutionId>,
    pub started_at: Option<DateTime<Utc>>,
    /// Next fire of the recurring timer.
    pub next_run: Option<DateTime<Utc>>,
    pub has_one_shot: bool,
}
