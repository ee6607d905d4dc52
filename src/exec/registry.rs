// src/exec/registry.rs

//! In-flight execution tracking and per-script run exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedMutexGuard, oneshot};
use tracing::{debug, error, info};

use crate::errors::{LauncherError, Result};
use crate::exec::execution::{Execution, ExecutionCell, ExecutionId, StopRequest};
use crate::exec::runner::{LAUNCH_FAILURE_EXIT_CODE, ProcessRunner};
use crate::logsink::{self, Level, LogSink};
use crate::types::{ExecutionStatus, ScriptId, Trigger};

/// One lock per script, created on first use and kept for the life of the
/// registry. The id space is bounded by the record store.
#[derive(Debug, Default)]
pub struct ScriptGates {
    gates: Mutex<HashMap<ScriptId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ScriptGates {
    /// Try to take the gate for `script_id` without waiting.
    pub fn try_acquire(&self, script_id: ScriptId) -> Option<OwnedMutexGuard<()>> {
        let gate = {
            let mut gates = self.gates.lock();
            Arc::clone(gates.entry(script_id).or_default())
        };
        gate.try_lock_owned().ok()
    }

    pub fn len(&self) -> usize {
        self.gates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marks the execution failed if the run future is dropped before the
/// runner reached a terminal state (e.g. during shutdown).
struct RunGuard {
    cell: Arc<ExecutionCell>,
    _gate: OwnedMutexGuard<()>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.cell.finish(ExecutionStatus::Failed, LAUNCH_FAILURE_EXIT_CODE) {
            debug!(execution_id = %self.cell.id(), "run abandoned before completion; marked failed");
        }
    }
}

/// Tracks executions by id and serialises runs per script.
///
/// Finished executions stay queryable until the registry is dropped.
pub struct RunRegistry {
    gates: ScriptGates,
    executions: RwLock<HashMap<ExecutionId, Arc<ExecutionCell>>>,
    runner: ProcessRunner,
    sink: Arc<dyn LogSink>,
}

impl RunRegistry {
    pub fn new(runner: ProcessRunner, sink: Arc<dyn LogSink>) -> Self {
        Self {
            gates: ScriptGates::default(),
            executions: RwLock::new(HashMap::new()),
            runner,
            sink,
        }
    }

    /// Run a script to completion.
    ///
    /// Fails immediately with `AlreadyRunning` if another run of the same
    /// script holds the gate; never queues. Spawn failures are logged and
    /// returned as `LaunchFailure` with the execution already marked failed.
    pub async fn run(
        &self,
        script_id: ScriptId,
        script_name: &str,
        path: &str,
        trigger: Trigger,
    ) -> Result<Execution> {
        let Some(gate) = self.gates.try_acquire(script_id) else {
            debug!(script_id, script = %script_name, %trigger, "run refused: gate held");
            return Err(LauncherError::AlreadyRunning(script_name.to_string()));
        };

        let (stop_tx, stop_rx) = oneshot::channel::<StopRequest>();
        let cell = Arc::new(ExecutionCell::new(script_id, script_name, trigger, stop_tx));
        let execution_id = cell.id();
        self.executions.write().insert(execution_id, Arc::clone(&cell));

        let guard = RunGuard {
            cell: Arc::clone(&cell),
            _gate: gate,
        };

        info!(script_id, script = %script_name, %execution_id, %trigger, "execution started");
        logsink::emit(
            self.sink.as_ref(),
            script_id,
            script_name,
            Level::Info,
            &format!("Execution started (trigger={trigger})"),
        )
        .await;

        let result = self.runner.run(&cell, path, stop_rx).await;
        drop(guard);

        match result {
            Ok(()) => Ok(cell.snapshot()),
            Err(e) => {
                error!(script_id, script = %script_name, %execution_id, error = %e, "execution failed");
                Err(e)
            }
        }
    }

    /// Stop a running execution: graceful signal, then kill after the grace
    /// period.
    ///
    /// Returns `false` if the execution is unknown, already terminal, or
    /// finished on its own while the stop was being delivered.
    pub async fn stop(&self, execution_id: ExecutionId) -> bool {
        let Some(cell) = self.executions.read().get(&execution_id).cloned() else {
            return false;
        };
        if !cell.is_running() {
            return false;
        }
        let Some(stop_tx) = cell.take_stop() else {
            return false;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if stop_tx.send(StopRequest { ack: ack_tx }).is_err() {
            return false;
        }
        ack_rx.await.is_ok()
    }

    pub fn is_running(&self, script_id: ScriptId) -> bool {
        self.executions
            .read()
            .values()
            .any(|cell| cell.script_id() == script_id && cell.is_running())
    }

    /// The running execution of a script, if any.
    pub fn running_for(&self, script_id: ScriptId) -> Option<Execution> {
        self.executions
            .read()
            .values()
            .map(|cell| cell.snapshot())
            .find(|e| e.script_id == script_id && e.is_running())
    }

    /// All executions currently running, oldest first.
    pub fn list_active(&self) -> Vec<Execution> {
        let mut active: Vec<_> = self
            .executions
            .read()
            .values()
            .map(|cell| cell.snapshot())
            .filter(Execution::is_running)
            .collect();
        active.sort_by_key(|e| e.started_at);
        active
    }

    /// Every retained execution of a script, oldest first.
    pub fn executions_for(&self, script_id: ScriptId) -> Vec<Execution> {
        let mut history: Vec<_> = self
            .executions
            .read()
            .values()
            .filter(|cell| cell.script_id() == script_id)
            .map(|cell| cell.snapshot())
            .collect();
        history.sort_by_key(|e| e.started_at);
        history
    }

    pub fn get(&self, execution_id: ExecutionId) -> Option<Execution> {
        self.executions
            .read()
            .get(&execution_id)
            .map(|cell| cell.snapshot())
    }

    /// Number of retained execution records.
    pub fn len(&self) -> usize {
        self.executions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
