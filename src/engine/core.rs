// src/engine/core.rs

use std::sync::Arc;

use anyhow::anyhow;
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::EngineSection;
use crate::engine::status::ScriptStatus;
use crate::errors::{LauncherError, Result};
use crate::exec::{Execution, ExecutionId, ProcessRunner, RunRegistry, RunnerOptions};
use crate::logsink::{self, Level, LogEntry, LogManager, LogNotification, LogSink};
use crate::schedule::lifecycle;
use crate::schedule::{Clock, Scheduler, SchedulerOptions, StartupReport, SystemClock};
use crate::script::{ScriptConfig, ScriptPatch};
use crate::store::RecordStore;
use crate::types::{ScriptId, Trigger};

/// The execution-and-scheduling engine.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn RecordStore>,
    logs: Arc<LogManager>,
    registry: Arc<RunRegistry>,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Build an engine from the `[engine]` config section.
    pub fn new(settings: &EngineSection, store: Arc<dyn RecordStore>) -> Result<Self> {
        let logs = Arc::new(LogManager::with_buffer(
            &settings.logs_dir,
            settings.subscriber_buffer,
        )?);
        Ok(Self::with_parts(
            store,
            logs,
            Arc::new(SystemClock),
            settings.runner_options(),
            settings.scheduler_options(),
        ))
    }

    pub fn with_parts(
        store: Arc<dyn RecordStore>,
        logs: Arc<LogManager>,
        clock: Arc<dyn Clock>,
        runner: RunnerOptions,
        scheduler: SchedulerOptions,
    ) -> Self {
        let sink: Arc<dyn LogSink> = logs.clone();
        let runner = ProcessRunner::new(runner, Arc::clone(&sink));
        let registry = Arc::new(RunRegistry::new(runner, Arc::clone(&sink)));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            sink,
            Arc::clone(&clock),
            scheduler,
        );
        Self {
            store,
            logs,
            registry,
            scheduler,
            clock,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn logs(&self) -> &Arc<LogManager> {
        &self.logs
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Start the scheduler and run the startup sweep.
    pub async fn start(&self) -> Result<StartupReport> {
        self.scheduler.start();
        let report = self.scheduler.load_scheduled_scripts().await?;
        info!(
            recurring = report.recurring.len(),
            one_shot = report.one_shot.len(),
            deactivated = report.deactivated.len(),
            "engine started"
        );
        Ok(report)
    }

    /// Bounded shutdown; safe to call more than once.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    // ---------------------------------------------------------------------
    // Script records
    // ---------------------------------------------------------------------

    pub async fn get_script(&self, id: ScriptId) -> Result<ScriptConfig> {
        self.store
            .get(id)
            .await?
            .ok_or(LauncherError::ScriptNotFound(id))
    }

    pub async fn list_scripts(&self) -> Result<Vec<ScriptConfig>> {
        self.store.list().await
    }

    pub async fn create_script(&self, config: ScriptConfig) -> Result<ScriptConfig> {
        config.validate()?;
        let created = self.store.insert(config).await?;
        info!(script_id = created.id, script = %created.name, "script created");
        self.scheduler.update_job(&created);
        Ok(created)
    }

    /// Apply a partial update. An active script left with nothing to
    /// schedule is switched off in the same write.
    pub async fn update_script(&self, id: ScriptId, mut patch: ScriptPatch) -> Result<ScriptConfig> {
        let mut candidate = self.get_script(id).await?;
        patch.clone().apply(&mut candidate);
        candidate.validate()?;

        if candidate.is_active && !lifecycle::should_remain_active(&candidate, self.clock.now()) {
            info!(script_id = id, "nothing left to schedule; deactivating on update");
            patch.is_active = Some(false);
        }

        let updated = self.store.update(id, patch).await?;
        debug!(script_id = id, "script updated");
        self.scheduler.update_job(&updated);
        Ok(updated)
    }

    pub async fn enable_script(&self, id: ScriptId) -> Result<ScriptConfig> {
        self.set_active(id, true).await
    }

    /// Disable a script and cancel both of its timers. A run already in
    /// progress is not interrupted.
    pub async fn disable_script(&self, id: ScriptId) -> Result<ScriptConfig> {
        self.set_active(id, false).await
    }

    async fn set_active(&self, id: ScriptId, active: bool) -> Result<ScriptConfig> {
        self.get_script(id).await?;
        let updated = self.store.update(id, ScriptPatch::active(active)).await?;
        info!(script_id = id, active, "script activation changed");
        self.scheduler.update_job(&updated);
        Ok(updated)
    }

    pub async fn delete_script(&self, id: ScriptId) -> Result<()> {
        self.scheduler.remove_all(id);
        if !self.store.delete(id).await? {
            return Err(LauncherError::ScriptNotFound(id));
        }
        info!(script_id = id, "script deleted");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Manual runs
    // ---------------------------------------------------------------------

    /// Run a script now and wait for it to finish.
    ///
    /// Returns the terminal execution, or `AlreadyRunning` / `LaunchFailure`.
    pub async fn run_script(&self, id: ScriptId) -> Result<Execution> {
        let script = self.get_script(id).await?;
        let result = self
            .registry
            .run(script.id, &script.name, &script.path, Trigger::Manual)
            .await;

        if !matches!(result, Err(LauncherError::AlreadyRunning(_))) {
            self.after_manual_run(&script).await;
        }
        result
    }

    /// Start a manual run in the background.
    ///
    /// A conflict is reported immediately; anything that goes wrong later is
    /// only logged. Background runs are tracked by the scheduler, so the
    /// engine must have been started.
    pub async fn trigger_script(&self, id: ScriptId) -> Result<()> {
        let script = self.get_script(id).await?;
        if self.registry.is_running(id) {
            return Err(LauncherError::AlreadyRunning(script.name));
        }

        let engine = self.clone();
        let dispatched = self.scheduler.dispatch(async move {
            match engine.run_script(script.id).await {
                Ok(execution) => {
                    debug!(script_id = script.id, execution_id = %execution.id, "background run finished");
                }
                Err(e) => {
                    warn!(script_id = script.id, error = %e, "background run failed");
                }
            }
        });
        if !dispatched {
            return Err(LauncherError::Other(anyhow!(
                "engine is not running; cannot start background runs"
            )));
        }
        Ok(())
    }

    async fn after_manual_run(&self, fired: &ScriptConfig) {
        if let Err(e) = self.deactivate_if_done(fired).await {
            // Best effort: the run itself already completed.
            error!(script_id = fired.id, error = %e, "post-run deactivation failed");
        }
    }

    async fn deactivate_if_done(&self, fired: &ScriptConfig) -> Result<()> {
        let Some(current) = self.store.get(fired.id).await? else {
            return Ok(());
        };
        if !lifecycle::deactivate_after_run(&current, self.clock.now()) {
            return Ok(());
        }

        let updated = self
            .store
            .update(current.id, ScriptPatch::active(false))
            .await?;
        logsink::emit(
            self.logs.as_ref(),
            updated.id,
            &updated.name,
            Level::Info,
            "Script deactivated after execution (no repetition configured)",
        )
        .await;
        self.scheduler.update_job(&updated);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Executions
    // ---------------------------------------------------------------------

    /// Stop the running execution of a script and return its final record.
    pub async fn stop_script(&self, id: ScriptId) -> Result<Execution> {
        let script = self.get_script(id).await?;
        let Some(running) = self.registry.running_for(id) else {
            return Err(LauncherError::StopNotApplicable(script.name));
        };
        self.stop_execution(running.id).await
    }

    pub async fn stop_execution(&self, execution_id: ExecutionId) -> Result<Execution> {
        if self.registry.get(execution_id).is_none() {
            return Err(LauncherError::ExecutionNotFound(execution_id.to_string()));
        }
        if !self.registry.stop(execution_id).await {
            return Err(LauncherError::StopNotApplicable(execution_id.to_string()));
        }
        self.execution(execution_id)
    }

    pub async fn script_status(&self, id: ScriptId) -> Result<ScriptStatus> {
        let script = self.get_script(id).await?;
        let running = self.registry.running_for(id);
        Ok(ScriptStatus {
            script_id: id,
            is_active: script.is_active,
            is_running: running.is_some(),
            execution_id: running.as_ref().map(|e| e.id),
            started_at: running.as_ref().map(|e| e.started_at),
            next_run: self.scheduler.next_run(id),
            has_one_shot: self.scheduler.has_one_shot(id),
        })
    }

    pub fn active_executions(&self) -> Vec<Execution> {
        self.registry.list_active()
    }

    pub fn execution(&self, execution_id: ExecutionId) -> Result<Execution> {
        self.registry
            .get(execution_id)
            .ok_or_else(|| LauncherError::ExecutionNotFound(execution_id.to_string()))
    }

    // ---------------------------------------------------------------------
    // Logs
    // ---------------------------------------------------------------------

    pub async fn read_logs(
        &self,
        date: Option<NaiveDate>,
        script_name: Option<&str>,
    ) -> Result<Vec<LogEntry>> {
        self.logs.read_logs(date, script_name).await
    }

    pub async fn log_dates(&self) -> Result<Vec<NaiveDate>> {
        self.logs.available_dates().await
    }

    /// Live log notifications, optionally for one script only.
    pub fn subscribe_logs(&self, filter: Option<ScriptId>) -> mpsc::Receiver<LogNotification> {
        self.logs.subscribe(filter)
    }
}
