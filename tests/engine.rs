// tests/engine.rs

mod common;
use crate::common::{ScriptConfigBuilder, init_tracing, sh_options, with_timeout, write_script};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use script_launcher::engine::Engine;
use script_launcher::errors::{ErrorSignal, LauncherError};
use script_launcher::exec::{ExecutionId, SIGNAL_EXIT_CODE};
use script_launcher::logsink::{Level, LogManager};
use script_launcher::schedule::{SchedulerOptions, SystemClock};
use script_launcher::script::ScriptPatch;
use script_launcher::store::{MemoryStore, RecordStore};
use script_launcher::types::{ExecutionStatus, IntervalUnit, Trigger};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

struct Harness {
    engine: Engine,
    dir: TempDir,
}

impl Harness {
    fn new() -> Result<Self, Box<dyn Error>> {
        let dir = TempDir::new()?;
        let logs = Arc::new(LogManager::new(dir.path().join("logs"))?);
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let engine = Engine::with_parts(
            store,
            logs,
            Arc::new(SystemClock),
            sh_options(Duration::from_millis(500)),
            SchedulerOptions {
                shutdown_timeout: Duration::from_secs(2),
            },
        );
        Ok(Self { engine, dir })
    }

    fn script(&self, name: &str, body: &str) -> String {
        write_script(self.dir.path(), &format!("{name}.sh"), body)
            .display()
            .to_string()
    }
}

#[tokio::test]
async fn manual_run_of_unscheduled_script_deactivates_it() -> TestResult {
    init_tracing();
    let h = Harness::new()?;
    let path = h.script("adhoc", "echo adhoc");
    h.engine
        .create_script(ScriptConfigBuilder::new(1, "adhoc").path(&path).build())
        .await?;
    assert!(h.engine.get_script(1).await?.is_active);

    let execution = with_timeout(h.engine.run_script(1)).await?;
    assert_eq!(execution.status, ExecutionStatus::Success);
    assert_eq!(execution.trigger, Trigger::Manual);

    assert!(!h.engine.get_script(1).await?.is_active);
    let lines = h.engine.read_logs(None, Some("adhoc")).await?;
    let messages: Vec<_> = lines.iter().map(|e| (e.level, e.message.as_str())).collect();
    assert!(messages.contains(&(Level::Stdout, "adhoc")));
    assert!(messages.contains(&(
        Level::Info,
        "Script deactivated after execution (no repetition configured)"
    )));
    Ok(())
}

#[tokio::test]
async fn manual_run_keeps_repeating_scripts_active() -> TestResult {
    init_tracing();
    let h = Harness::new()?;
    let path = h.script("repeat", "true");
    h.engine.start().await?;
    h.engine
        .create_script(
            ScriptConfigBuilder::new(1, "repeat")
                .path(&path)
                .every(1, IntervalUnit::Hours)
                .build(),
        )
        .await?;

    h.engine.run_script(1).await?;
    assert!(h.engine.get_script(1).await?.is_active);
    assert!(h.engine.scheduler().has_recurring(1));

    let status = h.engine.script_status(1).await?;
    assert!(status.is_active);
    assert!(!status.is_running);
    assert!(status.next_run.is_some());

    h.engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn create_with_pending_start_only_installs_one_shot() -> TestResult {
    init_tracing();
    let h = Harness::new()?;
    h.engine.start().await?;

    let config = ScriptConfigBuilder::new(1, "kickoff")
        .every(30, IntervalUnit::Seconds)
        .start_at(Utc::now() + TimeDelta::hours(1))
        .build();
    h.engine.create_script(config).await?;

    assert!(h.engine.scheduler().has_one_shot(1));
    assert!(!h.engine.scheduler().has_recurring(1));
    let status = h.engine.script_status(1).await?;
    assert!(status.has_one_shot);
    assert!(status.next_run.is_none());

    h.engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn conflicts_and_missing_targets_carry_distinct_signals() -> TestResult {
    init_tracing();
    let h = Harness::new()?;
    let path = h.script("slow", "sleep 1");
    h.engine.start().await?;
    h.engine
        .create_script(
            ScriptConfigBuilder::new(1, "slow")
                .path(&path)
                .every(1, IntervalUnit::Days)
                .build(),
        )
        .await?;

    let err = h.engine.stop_script(1).await.expect_err("nothing running");
    assert!(matches!(err, LauncherError::StopNotApplicable(_)));
    assert_eq!(err.signal(), ErrorSignal::NotFound);

    h.engine.trigger_script(1).await?;
    with_timeout(async {
        while !h.engine.registry().is_running(1) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    let err = h.engine.run_script(1).await.expect_err("already running");
    assert_eq!(err.signal(), ErrorSignal::Conflict);
    let err = h.engine.trigger_script(1).await.expect_err("already running");
    assert_eq!(err.signal(), ErrorSignal::Conflict);

    let err = h.engine.run_script(99).await.expect_err("unknown script");
    assert_eq!(err.signal(), ErrorSignal::NotFound);
    let err = h.engine.execution(ExecutionId::nil()).expect_err("unknown execution");
    assert_eq!(err.signal(), ErrorSignal::NotFound);

    h.engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn stop_script_stops_the_running_execution() -> TestResult {
    init_tracing();
    let h = Harness::new()?;
    let path = h.script("forever", "sleep 30");
    h.engine.start().await?;
    h.engine
        .create_script(
            ScriptConfigBuilder::new(1, "forever")
                .path(&path)
                .every(1, IntervalUnit::Days)
                .build(),
        )
        .await?;

    h.engine.trigger_script(1).await?;
    with_timeout(async {
        while h.engine.active_executions().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    let status = h.engine.script_status(1).await?;
    assert!(status.is_running);
    let running_id = status.execution_id.expect("execution id");

    let stopped = with_timeout(h.engine.stop_script(1)).await?;
    assert_eq!(stopped.id, running_id);
    assert_eq!(stopped.status, ExecutionStatus::Failed);
    assert_eq!(stopped.exit_code, Some(SIGNAL_EXIT_CODE));
    assert_eq!(h.engine.execution(running_id)?.exit_code, Some(SIGNAL_EXIT_CODE));
    assert!(h.engine.active_executions().is_empty());

    h.engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn update_deactivates_scripts_left_without_a_schedule() -> TestResult {
    init_tracing();
    let h = Harness::new()?;
    h.engine.start().await?;
    h.engine
        .create_script(
            ScriptConfigBuilder::new(1, "r")
                .every(5, IntervalUnit::Minutes)
                .build(),
        )
        .await?;
    assert!(h.engine.scheduler().has_recurring(1));

    let patch = ScriptPatch {
        repeat_enabled: Some(false),
        ..ScriptPatch::default()
    };
    let updated = h.engine.update_script(1, patch).await?;
    assert!(!updated.is_active);
    assert!(!h.engine.scheduler().has_recurring(1));

    // Invalid updates are rejected and change nothing.
    let bad = ScriptPatch {
        repeat_enabled: Some(true),
        interval_value: Some(None),
        ..ScriptPatch::default()
    };
    let err = h.engine.update_script(1, bad).await.expect_err("missing interval");
    assert_eq!(err.signal(), ErrorSignal::Invalid);
    assert!(!h.engine.get_script(1).await?.repeat_enabled);

    h.engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn enable_disable_and_delete_reconcile_timers() -> TestResult {
    init_tracing();
    let h = Harness::new()?;
    h.engine.start().await?;
    h.engine
        .create_script(
            ScriptConfigBuilder::new(1, "both")
                .every(5, IntervalUnit::Minutes)
                .start_at(Utc::now() + TimeDelta::hours(1))
                .build(),
        )
        .await?;
    assert!(h.engine.scheduler().has_one_shot(1));

    h.engine.disable_script(1).await?;
    assert!(!h.engine.scheduler().has_one_shot(1));
    assert!(!h.engine.scheduler().has_recurring(1));

    h.engine.enable_script(1).await?;
    assert!(h.engine.scheduler().has_one_shot(1));

    h.engine.delete_script(1).await?;
    assert!(!h.engine.scheduler().has_one_shot(1));
    let err = h.engine.get_script(1).await.expect_err("deleted");
    assert!(matches!(err, LauncherError::ScriptNotFound(1)));
    assert!(h.engine.delete_script(1).await.is_err());

    h.engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn background_runs_need_a_started_engine() -> TestResult {
    init_tracing();
    let h = Harness::new()?;
    let path = h.script("bg", "true");
    h.engine
        .create_script(ScriptConfigBuilder::new(1, "bg").path(&path).build())
        .await?;

    let err = h.engine.trigger_script(1).await.expect_err("not started");
    assert_eq!(err.signal(), ErrorSignal::Internal);

    h.engine.start().await?;
    // The sweep deactivated the unscheduled script; manual runs still work.
    assert!(!h.engine.get_script(1).await?.is_active);
    h.engine.trigger_script(1).await?;
    with_timeout(async {
        while h.engine.registry().executions_for(1).is_empty()
            || h.engine.registry().is_running(1)
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert_eq!(
        h.engine.registry().executions_for(1)[0].status,
        ExecutionStatus::Success
    );

    h.engine.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn live_subscribers_receive_run_output() -> TestResult {
    init_tracing();
    let h = Harness::new()?;
    let path = h.script("chatty", "echo one\necho two");
    h.engine
        .create_script(ScriptConfigBuilder::new(1, "chatty").path(&path).build())
        .await?;
    h.engine
        .create_script(ScriptConfigBuilder::new(2, "other").path(&path).build())
        .await?;

    let mut mine = h.engine.subscribe_logs(Some(1));
    h.engine.run_script(1).await?;
    h.engine.run_script(2).await?;

    let mut stdout = Vec::new();
    while let Ok(n) = mine.try_recv() {
        assert_eq!(n.script_id, Some(1));
        if n.level == Level::Stdout {
            stdout.push(n.message);
        }
    }
    assert_eq!(stdout, vec!["one", "two"]);
    assert_eq!(h.engine.log_dates().await?.len(), 1);
    Ok(())
}
