// tests/runner.rs

mod common;
use crate::common::{init_tracing, registry, with_timeout, write_script};

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use script_launcher::errors::{ErrorSignal, LauncherError};
use script_launcher::exec::{ProcessRunner, RunRegistry, RunnerOptions, SIGNAL_EXIT_CODE};
use script_launcher::logsink::{Level, LogSink};
use script_launcher::types::{ExecutionStatus, Trigger};
use script_launcher_test_utils::sink::RecordingSink;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

const GRACE: Duration = Duration::from_millis(500);

async fn wait_until_running(registry: &RunRegistry, script_id: i64) {
    with_timeout(async {
        while !registry.is_running(script_id) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn zero_exit_is_success_and_output_is_captured() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "hello.sh", "echo hello\necho oops >&2\necho world");
    let sink = Arc::new(RecordingSink::new());
    let registry = registry(Arc::clone(&sink), GRACE);

    let execution = with_timeout(registry.run(1, "hello", script.to_str().unwrap(), Trigger::Manual)).await?;

    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.exit_code, Some(0));
    assert_eq!(execution.trigger, Trigger::Manual);
    assert!(execution.finished_at.is_some());
    assert_eq!(sink.messages(1, Level::Stdout), vec!["hello", "world"]);
    assert_eq!(sink.messages(1, Level::Stderr), vec!["oops"]);

    let info = sink.messages(1, Level::Info);
    assert_eq!(info.first().map(String::as_str), Some("Execution started (trigger=manual)"));
    assert!(info.last().unwrap().starts_with("Execution finished (exit_code=0, duration="));
    Ok(())
}

#[tokio::test]
async fn invalid_utf8_output_is_replaced_not_dropped() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "bytes.sh", "printf 'ok\\377x\\n'\necho after");
    let sink = Arc::new(RecordingSink::new());
    let registry = registry(Arc::clone(&sink), GRACE);

    let execution = with_timeout(registry.run(1, "bytes", script.to_str().unwrap(), Trigger::Manual)).await?;

    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(sink.messages(1, Level::Stdout), vec!["ok\u{FFFD}x", "after"]);
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_codes_are_recorded_as_failures() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let sink = Arc::new(RecordingSink::new());
    let registry = registry(Arc::clone(&sink), GRACE);

    for (id, code) in [(1, 1), (2, 3), (3, 42)] {
        let script = write_script(dir.path(), &format!("exit{code}.sh"), &format!("exit {code}"));
        let execution =
            with_timeout(registry.run(id, "failing", script.to_str().unwrap(), Trigger::Scheduled)).await?;
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.exit_code, Some(code));
    }
    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_a_launch_failure() -> TestResult {
    init_tracing();
    let sink = Arc::new(RecordingSink::new());
    let dyn_sink: Arc<dyn LogSink> = sink.clone();
    let runner = ProcessRunner::new(
        RunnerOptions {
            interpreter: Some("no-such-interpreter-for-tests".to_string()),
            grace_period: GRACE,
        },
        Arc::clone(&dyn_sink),
    );
    let registry = RunRegistry::new(runner, dyn_sink);

    let err = registry
        .run(7, "broken", "whatever.py", Trigger::Manual)
        .await
        .expect_err("spawn must fail");

    assert!(matches!(err, LauncherError::LaunchFailure { .. }));
    assert_eq!(err.signal(), ErrorSignal::Internal);

    let history = registry.executions_for(7);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, ExecutionStatus::Failed);
    assert_eq!(history[0].exit_code, Some(-1));
    assert!(!registry.is_running(7));
    assert!(
        sink.messages(7, Level::Error)
            .iter()
            .any(|m| m.starts_with("Execution failed: "))
    );

    // The gate was released: the next attempt fails the same way instead of
    // reporting a conflict.
    let again = registry.run(7, "broken", "whatever.py", Trigger::Manual).await;
    assert!(matches!(again, Err(LauncherError::LaunchFailure { .. })));
    Ok(())
}

#[tokio::test]
async fn second_run_of_a_running_script_is_refused() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "slow.sh", "sleep 1");
    let path = script.to_str().unwrap().to_string();
    let sink = Arc::new(RecordingSink::new());
    let registry = registry(Arc::clone(&sink), GRACE);

    let first = {
        let registry = Arc::clone(&registry);
        let path = path.clone();
        tokio::spawn(async move { registry.run(1, "slow", &path, Trigger::Manual).await })
    };
    wait_until_running(&registry, 1).await;

    let err = registry
        .run(1, "slow", &path, Trigger::Scheduled)
        .await
        .expect_err("gate is held");
    assert!(matches!(err, LauncherError::AlreadyRunning(_)));
    assert_eq!(err.signal(), ErrorSignal::Conflict);

    // Another script is not affected.
    let other = write_script(dir.path(), "fast.sh", "true");
    let ok = registry.run(2, "fast", other.to_str().unwrap(), Trigger::Manual).await?;
    assert_eq!(ok.status, ExecutionStatus::Success);

    let finished = with_timeout(first).await??;
    assert_eq!(finished.status, ExecutionStatus::Success);
    assert_eq!(registry.executions_for(1).len(), 1);
    Ok(())
}

#[tokio::test]
async fn stop_terminates_with_the_signal_sentinel() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "forever.sh", "echo started\nsleep 30");
    let sink = Arc::new(RecordingSink::new());
    let registry = registry(Arc::clone(&sink), GRACE);

    let run = {
        let registry = Arc::clone(&registry);
        let path = script.to_str().unwrap().to_string();
        tokio::spawn(async move { registry.run(1, "forever", &path, Trigger::Manual).await })
    };
    wait_until_running(&registry, 1).await;
    let running = registry.running_for(1).expect("running execution");
    assert_eq!(registry.list_active().len(), 1);

    let started = Instant::now();
    assert!(registry.stop(running.id).await);
    assert!(started.elapsed() < GRACE + Duration::from_secs(2));

    let stopped = registry.get(running.id).expect("execution retained");
    assert_eq!(stopped.status, ExecutionStatus::Failed);
    assert_eq!(stopped.exit_code, Some(SIGNAL_EXIT_CODE));
    assert!(registry.list_active().is_empty());
    assert!(sink.contains(1, "Execution stopped by user"));

    let result = with_timeout(run).await?;
    assert_eq!(result?.exit_code, Some(SIGNAL_EXIT_CODE));
    Ok(())
}

#[tokio::test]
async fn stop_escalates_to_kill_when_term_is_ignored() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "stubborn.sh", "trap '' TERM\nwhile true; do sleep 0.1; done");
    let sink = Arc::new(RecordingSink::new());
    let grace = Duration::from_millis(300);
    let registry = registry(Arc::clone(&sink), grace);

    let run = {
        let registry = Arc::clone(&registry);
        let path = script.to_str().unwrap().to_string();
        tokio::spawn(async move { registry.run(1, "stubborn", &path, Trigger::Manual).await })
    };
    wait_until_running(&registry, 1).await;
    let running = registry.running_for(1).expect("running execution");

    let started = Instant::now();
    assert!(with_timeout(registry.stop(running.id)).await);
    assert!(started.elapsed() >= grace);
    assert!(started.elapsed() < grace + Duration::from_secs(3));

    let stopped = registry.get(running.id).expect("execution retained");
    assert_eq!(stopped.exit_code, Some(SIGNAL_EXIT_CODE));
    with_timeout(run).await??;
    Ok(())
}

#[tokio::test]
async fn stop_of_unknown_or_finished_execution_is_refused() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let script = write_script(dir.path(), "quick.sh", "true");
    let sink = Arc::new(RecordingSink::new());
    let registry = registry(Arc::clone(&sink), GRACE);

    assert!(!registry.stop(uuid_nil()).await);

    let done = registry.run(1, "quick", script.to_str().unwrap(), Trigger::Manual).await?;
    assert!(!registry.stop(done.id).await);
    assert_eq!(registry.get(done.id).unwrap().status, ExecutionStatus::Success);
    Ok(())
}

fn uuid_nil() -> script_launcher::exec::ExecutionId {
    script_launcher::exec::ExecutionId::nil()
}
