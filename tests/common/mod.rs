#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use script_launcher::exec::{ProcessRunner, RunRegistry, RunnerOptions};
use script_launcher::logsink::LogSink;
use script_launcher::schedule::{Clock, Scheduler, SchedulerOptions};
use script_launcher::store::{MemoryStore, RecordStore};
use script_launcher_test_utils::clock::ManualClock;
use script_launcher_test_utils::sink::RecordingSink;

pub use script_launcher_test_utils::builders::{ScriptConfigBuilder, write_script};
pub use script_launcher_test_utils::{init_tracing, with_timeout};

/// Scripts in tests are plain `sh` scripts.
pub fn sh_options(grace: Duration) -> RunnerOptions {
    RunnerOptions {
        interpreter: Some("sh".to_string()),
        grace_period: grace,
    }
}

pub fn registry(sink: Arc<RecordingSink>, grace: Duration) -> Arc<RunRegistry> {
    let sink: Arc<dyn LogSink> = sink;
    let runner = ProcessRunner::new(sh_options(grace), Arc::clone(&sink));
    Arc::new(RunRegistry::new(runner, sink))
}

/// A scheduler over an in-memory store, a recording sink and a manual clock.
pub struct SchedulerFixture {
    pub scheduler: Scheduler,
    pub registry: Arc<RunRegistry>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub clock: Arc<ManualClock>,
}

impl SchedulerFixture {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(ManualClock::starting_now()), Duration::from_secs(2))
    }

    pub fn with_clock(clock: Arc<ManualClock>, shutdown_timeout: Duration) -> Self {
        let sink = Arc::new(RecordingSink::new());
        let registry = registry(Arc::clone(&sink), Duration::from_millis(500));
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            Arc::clone(&store) as Arc<dyn RecordStore>,
            Arc::clone(&sink) as Arc<dyn LogSink>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            SchedulerOptions { shutdown_timeout },
        );
        Self {
            scheduler,
            registry,
            store,
            sink,
            clock,
        }
    }
}
