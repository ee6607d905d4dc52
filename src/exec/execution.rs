// src/exec/execution.rs

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::types::{ExecutionStatus, ScriptId, Trigger};

pub type ExecutionId = Uuid;

/// Snapshot of one run of a script.
///
/// `script_name` is captured when the run starts, so later renames do not
/// rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub script_id: ScriptId,
    pub script_name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub trigger: Trigger,
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
}

impl Execution {
    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    pub fn duration(&self) -> Option<TimeDelta> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

/// Request sent to the runner owning the child process; the runner answers on
/// `ack` once the execution is terminal.
pub(crate) struct StopRequest {
    pub ack: oneshot::Sender<()>,
}

/// Registry-side state of an execution.
///
/// The child process itself lives inside the runner future; the cell only
/// holds the channel used to ask that runner to stop it.
pub(crate) struct ExecutionCell {
    record: Mutex<Execution>,
    stop_tx: Mutex<Option<oneshot::Sender<StopRequest>>>,
}

impl ExecutionCell {
    pub fn new(
        script_id: ScriptId,
        script_name: &str,
        trigger: Trigger,
        stop_tx: oneshot::Sender<StopRequest>,
    ) -> Self {
        Self {
            record: Mutex::new(Execution {
                id: Uuid::new_v4(),
                script_id,
                script_name: script_name.to_string(),
                started_at: Utc::now(),
                finished_at: None,
                trigger,
                status: ExecutionStatus::Running,
                exit_code: None,
            }),
            stop_tx: Mutex::new(Some(stop_tx)),
        }
    }

    pub fn snapshot(&self) -> Execution {
        self.record.lock().clone()
    }

    pub fn id(&self) -> ExecutionId {
        self.record.lock().id
    }

    pub fn script_id(&self) -> ScriptId {
        self.record.lock().script_id
    }

    pub fn is_running(&self) -> bool {
        self.record.lock().is_running()
    }

    /// Move to a terminal status. Only the first call has an effect; returns
    /// whether this call performed the transition.
    pub fn finish(&self, status: ExecutionStatus, exit_code: i32) -> bool {
        debug_assert!(status.is_terminal());
        let mut record = self.record.lock();
        if record.status.is_terminal() {
            return false;
        }
        record.status = status;
        record.exit_code = Some(exit_code);
        record.finished_at = Some(Utc::now());
        self.stop_tx.lock().take();
        true
    }

    /// Take the stop channel. `None` if the execution already finished or a
    /// stop is in progress.
    pub fn take_stop(&self) -> Option<oneshot::Sender<StopRequest>> {
        self.stop_tx.lock().take()
    }
}
