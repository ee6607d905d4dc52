// src/schedule/scheduler.rs

//! Scheduler service: per-script recurring and one-shot timers.
//!
//! Timers never run scripts themselves. When a timer fires it dispatches a
//! task onto the scheduler's task tracker and goes back to waiting, so a
//! long run never delays other timers. Every firing failure is logged and
//! swallowed: a timer must keep firing after a failed run.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::errors::{LauncherError, Result};
use crate::exec::{Execution, RunRegistry};
use crate::logsink::{self, Level, LogSink};
use crate::schedule::clock::Clock;
use crate::schedule::lifecycle::{self, PostFireAction, StartupDecision};
use crate::schedule::timers::{TimerEntry, TimerKind, TimerSlots};
use crate::script::{ScriptConfig, ScriptPatch};
use crate::store::RecordStore;
use crate::types::{ScriptId, Trigger, weekday_index};

/// Extra time granted to cancelled tasks before shutdown gives up on them.
const FORCE_RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// How long shutdown waits for in-flight runs before cancelling them.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Stopped,
}

/// Result of one timer firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Ran(Execution),
    /// Today's weekday (Monday = 0) is not in the script's filter.
    SkippedWeekday(u8),
    SkippedAlreadyRunning,
    Failed(String),
}

/// What the startup sweep did, per script id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    pub recurring: Vec<ScriptId>,
    pub one_shot: Vec<ScriptId>,
    pub deactivated: Vec<ScriptId>,
}

struct Inner {
    registry: Arc<RunRegistry>,
    store: Arc<dyn RecordStore>,
    sink: Arc<dyn LogSink>,
    clock: Arc<dyn Clock>,
    options: SchedulerOptions,
    recurring: TimerSlots,
    one_shot: TimerSlots,
    tasks: TaskTracker,
    cancel: CancellationToken,
    state: Mutex<State>,
    next_timer_id: AtomicU64,
}

/// Cheap to clone; all clones share the same timers.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<RunRegistry>,
        store: Arc<dyn RecordStore>,
        sink: Arc<dyn LogSink>,
        clock: Arc<dyn Clock>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                store,
                sink,
                clock,
                options,
                recurring: TimerSlots::new(TimerKind::Recurring),
                one_shot: TimerSlots::new(TimerKind::OneShot),
                tasks: TaskTracker::new(),
                cancel: CancellationToken::new(),
                state: Mutex::new(State::Idle),
                next_timer_id: AtomicU64::new(1),
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    fn sink(&self) -> &dyn LogSink {
        self.inner.sink.as_ref()
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.inner.registry
    }

    /// Start accepting timers. Idempotent; a stopped scheduler stays stopped.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        match *state {
            State::Idle => {
                *state = State::Running;
                info!("scheduler started");
            }
            State::Running => debug!("scheduler already running"),
            State::Stopped => warn!("scheduler was shut down; refusing to restart"),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.inner.state.lock() == State::Running
    }

    /// Cancel all timers and wait (bounded) for in-flight runs.
    ///
    /// Runs still going after `shutdown_timeout` are cancelled, which kills
    /// their processes. Only the first call does anything.
    pub async fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == State::Stopped {
                return;
            }
            *state = State::Stopped;
        }

        let cancelled = self.inner.recurring.cancel_all() + self.inner.one_shot.cancel_all();
        let tasks = &self.inner.tasks;
        tasks.close();
        info!(timers = cancelled, in_flight = tasks.len(), "scheduler shutting down");

        if tokio::time::timeout(self.inner.options.shutdown_timeout, tasks.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = tasks.len(),
                timeout = ?self.inner.options.shutdown_timeout,
                "in-flight runs did not finish in time; cancelling"
            );
            self.inner.cancel.cancel();
            if tokio::time::timeout(FORCE_RELEASE_TIMEOUT, tasks.wait())
                .await
                .is_err()
            {
                warn!(in_flight = tasks.len(), "abandoning tasks that ignored cancellation");
            }
        }

        info!("scheduler stopped");
    }

    /// Run `work` on the scheduler's task tracker. Returns `false` (and drops
    /// the work) when the scheduler is not running.
    pub fn dispatch<F>(&self, work: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Held across the spawn so shutdown cannot close the tracker in between.
        let state = self.inner.state.lock();
        if *state != State::Running {
            debug!("scheduler not running; dropping dispatched work");
            return false;
        }
        let cancel = self.inner.cancel.clone();
        self.inner.tasks.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("dispatched work cancelled by shutdown"),
                _ = work => {}
            }
        });
        true
    }

    fn next_timer_id(&self) -> u64 {
        self.inner.next_timer_id.fetch_add(1, Ordering::Relaxed)
    }

    // ---------------------------------------------------------------------
    // Timer management
    // ---------------------------------------------------------------------

    /// Reconcile both timers of a script with its configuration.
    pub fn update_job(&self, config: &ScriptConfig) {
        let plan = lifecycle::desired_timers(config, self.now());
        debug!(script_id = config.id, ?plan, "reconciling timers");

        if plan.recurring {
            self.add_recurring(config);
        } else {
            self.remove_recurring(config.id);
        }

        if plan.one_shot {
            self.add_one_shot(config);
        } else {
            self.remove_one_shot(config.id);
        }
    }

    /// (Re)install the recurring timer. No-op without a valid interval.
    pub fn add_recurring(&self, config: &ScriptConfig) {
        if !self.is_running() {
            debug!(script_id = config.id, "scheduler not running; recurring timer not installed");
            return;
        }
        let Some(interval) = config.recurring_interval() else {
            debug!(script_id = config.id, "no valid interval; recurring timer not installed");
            return;
        };

        let Some(first_tick) = Instant::now().checked_add(interval) else {
            warn!(
                script_id = config.id,
                every = %config.interval_label(),
                "interval out of range; recurring timer not installed"
            );
            return;
        };

        let timer_id = self.next_timer_id();
        let next_fire = Arc::new(Mutex::new(fire_time_after(self.now(), interval)));

        let weak = Arc::downgrade(&self.inner);
        let snapshot = config.clone();
        let next = Arc::clone(&next_fire);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(scheduler) = Scheduler::from_weak(&weak) else {
                    break;
                };
                *next.lock() = fire_time_after(scheduler.now(), interval);

                let target = snapshot.clone();
                let fire = scheduler.clone();
                scheduler.dispatch(async move {
                    fire.fire_recurring(&target).await;
                });
            }
        });

        self.inner.recurring.install(
            config.id,
            TimerEntry {
                id: timer_id,
                handle: task.abort_handle(),
                next_fire,
            },
        );
        info!(
            script_id = config.id,
            script = %config.name,
            every = %config.interval_label(),
            "recurring timer installed"
        );
    }

    pub fn remove_recurring(&self, script_id: ScriptId) {
        self.inner.recurring.cancel(script_id);
    }

    /// (Re)install the one-shot timer. A start time in the past fires at once.
    pub fn add_one_shot(&self, config: &ScriptConfig) {
        if !self.is_running() {
            debug!(script_id = config.id, "scheduler not running; one-shot timer not installed");
            return;
        }
        let Some(at) = config.one_shot_at() else {
            debug!(script_id = config.id, "no start time; one-shot timer not installed");
            return;
        };

        let now = self.now();
        let delay = at.delay_from(now);
        let timer_id = self.next_timer_id();
        let next_fire = Arc::new(Mutex::new(fire_time_after(now, delay)));

        // The timer must not fire before its entry is installed, otherwise
        // it could not release itself.
        let (armed_tx, armed_rx) = oneshot::channel::<()>();
        let weak = Arc::downgrade(&self.inner);
        let snapshot = config.clone();
        let task = tokio::spawn(async move {
            if armed_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            let Some(scheduler) = Scheduler::from_weak(&weak) else {
                return;
            };
            let fire = scheduler.clone();
            scheduler.dispatch(async move {
                fire.fire_one_shot_timer(&snapshot, timer_id).await;
            });
        });

        self.inner.one_shot.install(
            config.id,
            TimerEntry {
                id: timer_id,
                handle: task.abort_handle(),
                next_fire,
            },
        );
        let _ = armed_tx.send(());

        if delay.is_zero() {
            info!(script_id = config.id, script = %config.name, %at, "one-shot start already due; firing now");
        } else {
            info!(script_id = config.id, script = %config.name, %at, "one-shot timer installed");
        }
    }

    pub fn remove_one_shot(&self, script_id: ScriptId) {
        self.inner.one_shot.cancel(script_id);
    }

    /// Cancel both timers of a script (e.g. on deletion).
    pub fn remove_all(&self, script_id: ScriptId) {
        self.remove_recurring(script_id);
        self.remove_one_shot(script_id);
    }

    pub fn has_recurring(&self, script_id: ScriptId) -> bool {
        self.inner.recurring.contains(script_id)
    }

    pub fn has_one_shot(&self, script_id: ScriptId) -> bool {
        self.inner.one_shot.contains(script_id)
    }

    /// Next fire time of the recurring timer.
    pub fn next_run(&self, script_id: ScriptId) -> Option<DateTime<Utc>> {
        self.inner.recurring.next_fire(script_id)
    }

    /// Number of installed timers (recurring, one-shot).
    pub fn timer_counts(&self) -> (usize, usize) {
        (self.inner.recurring.len(), self.inner.one_shot.len())
    }

    // ---------------------------------------------------------------------
    // Firing
    // ---------------------------------------------------------------------

    /// Recurring fire handler: weekday filter, overlap check, then run.
    pub async fn fire_recurring(&self, config: &ScriptConfig) -> FireOutcome {
        let (id, name) = (config.id, config.name.as_str());

        let today = self.now().with_timezone(&Local).weekday();
        if !config.weekdays.allows(today) {
            let weekday = weekday_index(today);
            info!(script_id = id, weekday, "recurring run skipped by weekday filter");
            logsink::emit(
                self.sink(),
                id,
                name,
                Level::Info,
                &format!("Skipped: not scheduled for today (weekday={weekday})"),
            )
            .await;
            return FireOutcome::SkippedWeekday(weekday);
        }

        if self.inner.registry.is_running(id) {
            return self.skip_running(config, "Skipped: script is already running").await;
        }

        match self.inner.registry.run(id, name, &config.path, Trigger::Scheduled).await {
            Ok(execution) => FireOutcome::Ran(execution),
            Err(LauncherError::AlreadyRunning(_)) => {
                self.skip_running(config, "Skipped: script is already running").await
            }
            Err(e) => {
                error!(script_id = id, error = %e, "scheduled execution failed");
                logsink::emit(
                    self.sink(),
                    id,
                    name,
                    Level::Error,
                    &format!("Scheduled execution failed: {e}"),
                )
                .await;
                FireOutcome::Failed(e.to_string())
            }
        }
    }

    /// Fire the one-shot start of a script now, cancelling its pending timer.
    pub async fn fire_one_shot(&self, config: &ScriptConfig) -> FireOutcome {
        self.inner.one_shot.cancel(config.id);
        self.run_one_shot(config).await
    }

    async fn fire_one_shot_timer(&self, config: &ScriptConfig, timer_id: u64) -> FireOutcome {
        // Single-fire: drop our own handle before doing anything else.
        self.inner.one_shot.release(config.id, timer_id);
        self.run_one_shot(config).await
    }

    async fn run_one_shot(&self, config: &ScriptConfig) -> FireOutcome {
        let (id, name) = (config.id, config.name.as_str());
        const SKIPPED: &str = "Scheduled start skipped: script is already running";

        let outcome = if self.inner.registry.is_running(id) {
            self.skip_running(config, SKIPPED).await
        } else {
            match self
                .inner
                .registry
                .run(id, name, &config.path, Trigger::ScheduledStart)
                .await
            {
                Ok(execution) => FireOutcome::Ran(execution),
                Err(LauncherError::AlreadyRunning(_)) => self.skip_running(config, SKIPPED).await,
                Err(e) => {
                    error!(script_id = id, error = %e, "scheduled start execution failed");
                    logsink::emit(
                        self.sink(),
                        id,
                        name,
                        Level::Error,
                        &format!("Scheduled start execution failed: {e}"),
                    )
                    .await;
                    FireOutcome::Failed(e.to_string())
                }
            }
        };

        if let Err(e) = self.after_one_shot(config).await {
            error!(script_id = id, error = %e, "post-run bookkeeping failed");
            logsink::emit(
                self.sink(),
                id,
                name,
                Level::Error,
                &format!("Failed to handle post-execution: {e}"),
            )
            .await;
        }

        outcome
    }

    async fn skip_running(&self, config: &ScriptConfig, message: &str) -> FireOutcome {
        info!(script_id = config.id, "{message}");
        logsink::emit(self.sink(), config.id, &config.name, Level::Info, message).await;
        FireOutcome::SkippedAlreadyRunning
    }

    /// Decide the fate of a script once its one-shot start has fired,
    /// based on the record as it is now.
    async fn after_one_shot(&self, fired: &ScriptConfig) -> Result<()> {
        let Some(current) = self.inner.store.get(fired.id).await? else {
            warn!(script_id = fired.id, "script deleted before its one-shot completed");
            return Ok(());
        };

        match lifecycle::after_one_shot(&current, self.now()) {
            PostFireAction::EnableRecurring => {
                self.add_recurring(&current);
                logsink::emit(
                    self.sink(),
                    current.id,
                    &current.name,
                    Level::Info,
                    "Scheduled start completed, repeat schedule now active",
                )
                .await;
            }
            PostFireAction::Deactivate => {
                // Only is_active changes; the one-shot fields stay as the user set them.
                self.inner
                    .store
                    .update(current.id, ScriptPatch::active(false))
                    .await?;
                logsink::emit(
                    self.sink(),
                    current.id,
                    &current.name,
                    Level::Info,
                    "Script deactivated after one-time scheduled execution",
                )
                .await;
            }
            PostFireAction::KeepPending => {
                debug!(script_id = current.id, "one-shot rescheduled meanwhile; keeping script active");
            }
            PostFireAction::AlreadyInactive => {
                debug!(script_id = current.id, "script disabled meanwhile; nothing to do");
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Startup
    // ---------------------------------------------------------------------

    /// Load timers for every active script and deactivate the ones with
    /// nothing left to run.
    pub async fn load_scheduled_scripts(&self) -> Result<StartupReport> {
        let scripts = self.inner.store.list_active().await?;
        let now = self.now();
        let mut report = StartupReport::default();

        for script in scripts {
            match lifecycle::classify_startup(&script, now) {
                StartupDecision::Repeat { pending_one_shot: None } => {
                    info!(
                        script_id = script.id,
                        "Loaded repeat job: {} (every {})",
                        script.name,
                        script.interval_label()
                    );
                    self.add_recurring(&script);
                    report.recurring.push(script.id);
                }
                StartupDecision::Repeat { pending_one_shot: Some(at) } => {
                    info!(
                        script_id = script.id,
                        "Loaded repeat job: {} (every {}), waiting for scheduled start at {}",
                        script.name,
                        script.interval_label(),
                        at
                    );
                    self.add_one_shot(&script);
                    report.one_shot.push(script.id);
                }
                StartupDecision::FutureOneShot(at) => {
                    info!(script_id = script.id, "Loaded scheduled start: {} (at {})", script.name, at);
                    self.add_one_shot(&script);
                    report.one_shot.push(script.id);
                }
                StartupDecision::ExpiredOneShot(at) => {
                    info!(
                        script_id = script.id,
                        "Deactivated expired script: {} (scheduled for {})",
                        script.name,
                        at
                    );
                    if self.deactivate(&script).await {
                        report.deactivated.push(script.id);
                    }
                }
                StartupDecision::Unscheduled => {
                    info!(script_id = script.id, "Deactivated script without scheduling: {}", script.name);
                    if self.deactivate(&script).await {
                        report.deactivated.push(script.id);
                    }
                }
            }
        }

        Ok(report)
    }

    async fn deactivate(&self, script: &ScriptConfig) -> bool {
        match self
            .inner
            .store
            .update(script.id, ScriptPatch::active(false))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                error!(script_id = script.id, error = %e, "failed to deactivate script");
                false
            }
        }
    }
}

/// Wall-clock time `after` from `now`, or `None` when it is not representable.
fn fire_time_after(now: DateTime<Utc>, after: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(after)
        .ok()
        .and_then(|step| now.checked_add_signed(step))
}
