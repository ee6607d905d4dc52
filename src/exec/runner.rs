// src/exec/runner.rs

//! Runs a single script process from spawn to reap.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::errors::{LauncherError, Result};
use crate::exec::command::build_command;
use crate::exec::execution::{ExecutionCell, StopRequest};
use crate::exec::output::pump_lines;
use crate::logsink::{self, Level, LogSink};
use crate::types::ExecutionStatus;

/// Exit code recorded for executions stopped on request (SIGTERM).
pub const SIGNAL_EXIT_CODE: i32 = -15;

/// Exit code recorded when the process could not be started or reaped.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

/// How long to keep draining output after a stopped process was reaped.
const OUTPUT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Program (plus leading args) used to run script paths. `None` executes
    /// the path directly.
    pub interpreter: Option<String>,
    /// Time between the graceful termination signal and the forced kill.
    pub grace_period: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            interpreter: Some("python3".to_string()),
            grace_period: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
pub struct ProcessRunner {
    options: RunnerOptions,
    sink: Arc<dyn LogSink>,
}

impl ProcessRunner {
    pub fn new(options: RunnerOptions, sink: Arc<dyn LogSink>) -> Self {
        Self { options, sink }
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Run the script behind `cell` to completion (or until stopped).
    ///
    /// stdout and stderr are drained concurrently and both reach
    /// end-of-stream before the exit status is collected, so no output is
    /// lost when the process exits first.
    pub(crate) async fn run(
        &self,
        cell: &ExecutionCell,
        path: &str,
        mut stop_rx: oneshot::Receiver<StopRequest>,
    ) -> Result<()> {
        let record = cell.snapshot();
        let (script_id, name) = (record.script_id, record.script_name.as_str());
        let sink = self.sink.as_ref();

        let mut cmd = build_command(self.options.interpreter.as_deref(), path);
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                cell.finish(ExecutionStatus::Failed, LAUNCH_FAILURE_EXIT_CODE);
                error!(script_id, script = %name, path, error = %source, "failed to spawn script process");
                logsink::emit(sink, script_id, name, Level::Error, &format!("Execution failed: {source}"))
                    .await;
                return Err(LauncherError::LaunchFailure {
                    script: name.to_string(),
                    source,
                });
            }
        };

        debug!(script_id, execution_id = %record.id, pid = ?child.id(), "script process spawned");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let drain = async {
            tokio::join!(
                pump_lines(stdout, sink, script_id, name, Level::Stdout),
                pump_lines(stderr, sink, script_id, name, Level::Stderr),
            )
        };
        tokio::pin!(drain);

        let mut drained = false;
        let mut stop_closed = false;
        let request = loop {
            tokio::select! {
                _ = &mut drain, if !drained => drained = true,
                status = child.wait(), if drained => return self.reap(cell, status).await,
                request = &mut stop_rx, if !stop_closed => match request {
                    Ok(request) => break request,
                    Err(_) => stop_closed = true,
                },
            }
        };

        info!(script_id, execution_id = %record.id, "stop requested; terminating process");
        terminate(&mut child, self.options.grace_period).await;
        if !drained && tokio::time::timeout(OUTPUT_FLUSH_TIMEOUT, &mut drain).await.is_err() {
            debug!(script_id, "output still open after stop; abandoning readers");
        }
        cell.finish(ExecutionStatus::Failed, SIGNAL_EXIT_CODE);
        logsink::emit(sink, script_id, name, Level::Info, "Execution stopped by user").await;
        let _ = request.ack.send(());
        Ok(())
    }

    async fn reap(&self, cell: &ExecutionCell, status: std::io::Result<ExitStatus>) -> Result<()> {
        let record = cell.snapshot();
        let (script_id, name) = (record.script_id, record.script_name.as_str());

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                cell.finish(ExecutionStatus::Failed, LAUNCH_FAILURE_EXIT_CODE);
                logsink::emit(
                    self.sink.as_ref(),
                    script_id,
                    name,
                    Level::Error,
                    &format!("Execution failed: {e}"),
                )
                .await;
                return Err(e.into());
            }
        };

        let code = exit_code(status);
        let outcome = if code == 0 {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };

        if !cell.finish(outcome, code) {
            // Stopped concurrently; the stop path already logged.
            return Ok(());
        }

        let finished = cell.snapshot();
        let secs = finished
            .duration()
            .map(|d| d.num_milliseconds() as f64 / 1000.0)
            .unwrap_or_default();

        info!(
            script_id,
            execution_id = %finished.id,
            exit_code = code,
            success = code == 0,
            "script process exited"
        );
        logsink::emit(
            self.sink.as_ref(),
            script_id,
            name,
            Level::Info,
            &format!("Execution finished (exit_code={code}, duration={secs:.2}s)"),
        )
        .await;

        Ok(())
    }
}

/// Exit code as a shell would report it; processes killed by a signal get
/// the negated signal number.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    LAUNCH_FAILURE_EXIT_CODE
}

/// Ask the process to exit, then kill it if it is still alive after `grace`.
async fn terminate(child: &mut Child, grace: Duration) {
    if signal_group(child, Signal::Term) {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(_)) => {
                debug!("process exited after termination signal");
                return;
            }
            Ok(Err(e)) => warn!(error = %e, "error waiting for terminated process"),
            Err(_) => warn!(?grace, "process did not exit within grace period; killing"),
        }
    }

    signal_group(child, Signal::Kill);
    if let Err(e) = child.kill().await {
        // Already reaped or gone.
        debug!(error = %e, "kill after grace period failed");
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// Signal the process group led by `child`, falling back to the process
/// itself. Returns `false` if no signal could be delivered.
#[cfg(unix)]
fn signal_group(child: &Child, which: Signal) -> bool {
    use nix::sys::signal::{self, Signal as NixSignal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|raw| i32::try_from(raw).ok()) else {
        return false;
    };
    let pid = Pid::from_raw(pid);
    let sig = match which {
        Signal::Term => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };

    match killpg(pid, sig).or_else(|_| signal::kill(pid, sig)) {
        Ok(()) => true,
        Err(e) => {
            debug!(%pid, signal = ?sig, error = %e, "signal failed; process likely already exited");
            false
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child, _which: Signal) -> bool {
    false
}
