// src/schedule/lifecycle.rs

//! Pure decisions about a script's active state and timers.
//!
//! Nothing here touches timers, the store or the clock; callers pass `now`.
//! The same rules are applied on configuration updates, in the startup
//! sweep, and after a one-shot run.

use chrono::DateTime;
use chrono::Utc;

use crate::script::ScriptConfig;
use crate::types::ScheduledAt;

/// One-shot start enabled and strictly in the future.
pub fn has_pending_one_shot(config: &ScriptConfig, now: DateTime<Utc>) -> bool {
    config.one_shot_at().is_some_and(|at| at.is_after(now))
}

/// Whether a script still has something to wait for: a recurring schedule,
/// or a one-shot start that has not happened yet.
pub fn should_remain_active(config: &ScriptConfig, now: DateTime<Utc>) -> bool {
    config.repeat_enabled || has_pending_one_shot(config, now)
}

/// Which timers a script should have right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerPlan {
    pub recurring: bool,
    pub one_shot: bool,
}

/// A pending one-shot suppresses the recurring timer until it has fired.
/// A one-shot whose time has passed still gets a timer and fires at once.
pub fn desired_timers(config: &ScriptConfig, now: DateTime<Utc>) -> TimerPlan {
    let pending = has_pending_one_shot(config, now);
    TimerPlan {
        recurring: config.repeat_enabled && config.is_active && !pending,
        one_shot: config.scheduled_start_enabled && config.is_active,
    }
}

/// Classification of an active script during the startup sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupDecision {
    /// Recurring schedule; `pending_one_shot` is set when a future one-shot
    /// must fire first.
    Repeat { pending_one_shot: Option<ScheduledAt> },
    /// No repeat, one-shot still ahead.
    FutureOneShot(ScheduledAt),
    /// No repeat, one-shot time already passed.
    ExpiredOneShot(ScheduledAt),
    /// Neither repeat nor a usable one-shot.
    Unscheduled,
}

impl StartupDecision {
    pub fn keeps_active(&self) -> bool {
        matches!(
            self,
            StartupDecision::Repeat { .. } | StartupDecision::FutureOneShot(_)
        )
    }
}

pub fn classify_startup(config: &ScriptConfig, now: DateTime<Utc>) -> StartupDecision {
    let one_shot = config.one_shot_at();

    if config.repeat_enabled {
        return StartupDecision::Repeat {
            pending_one_shot: one_shot.filter(|at| at.is_after(now)),
        };
    }

    match one_shot {
        Some(at) if at.is_after(now) => StartupDecision::FutureOneShot(at),
        Some(at) => StartupDecision::ExpiredOneShot(at),
        None => StartupDecision::Unscheduled,
    }
}

/// What to do once a one-shot start has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFireAction {
    /// Repeat is on: the recurring timer takes over.
    EnableRecurring,
    /// Nothing left to wait for: flip `is_active` off.
    Deactivate,
    /// The one-shot was moved into the future meanwhile; leave it alone.
    KeepPending,
    /// The script was disabled meanwhile.
    AlreadyInactive,
}

pub fn after_one_shot(config: &ScriptConfig, now: DateTime<Utc>) -> PostFireAction {
    if !config.is_active {
        PostFireAction::AlreadyInactive
    } else if !should_remain_active(config, now) {
        PostFireAction::Deactivate
    } else if config.repeat_enabled {
        PostFireAction::EnableRecurring
    } else {
        PostFireAction::KeepPending
    }
}

/// Whether a finished manual run should deactivate the script.
pub fn deactivate_after_run(config: &ScriptConfig, now: DateTime<Utc>) -> bool {
    config.is_active && !should_remain_active(config, now)
}
