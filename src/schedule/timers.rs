// src/schedule/timers.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::types::ScriptId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Recurring,
    OneShot,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerKind::Recurring => f.write_str("recurring"),
            TimerKind::OneShot => f.write_str("one-shot"),
        }
    }
}

/// Handle to a spawned timer task.
///
/// `id` is unique per timer so a firing one-shot can remove its own entry
/// without clobbering a replacement installed meanwhile.
pub struct TimerEntry {
    pub id: u64,
    pub handle: AbortHandle,
    pub next_fire: Arc<Mutex<Option<DateTime<Utc>>>>,
}

/// One timer slot per script for a given [`TimerKind`].
pub struct TimerSlots {
    kind: TimerKind,
    entries: Mutex<HashMap<ScriptId, TimerEntry>>,
}

impl TimerSlots {
    pub fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Install a timer, cancelling whatever occupied the slot before.
    pub fn install(&self, script_id: ScriptId, entry: TimerEntry) {
        if let Some(previous) = self.entries.lock().insert(script_id, entry) {
            previous.handle.abort();
            debug!(script_id, kind = %self.kind, timer_id = previous.id, "replaced timer");
        }
    }

    /// Cancel and forget the timer of a script. Returns whether one existed.
    pub fn cancel(&self, script_id: ScriptId) -> bool {
        match self.entries.lock().remove(&script_id) {
            Some(entry) => {
                entry.handle.abort();
                debug!(script_id, kind = %self.kind, timer_id = entry.id, "cancelled timer");
                true
            }
            None => false,
        }
    }

    /// Forget the entry of a timer that has fired, if it is still the one
    /// installed. The task is not aborted.
    pub fn release(&self, script_id: ScriptId, timer_id: u64) -> bool {
        let mut entries = self.entries.lock();
        if entries.get(&script_id).is_some_and(|e| e.id == timer_id) {
            entries.remove(&script_id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, script_id: ScriptId) -> bool {
        self.entries.lock().contains_key(&script_id)
    }

    pub fn next_fire(&self, script_id: ScriptId) -> Option<DateTime<Utc>> {
        self.entries
            .lock()
            .get(&script_id)
            .and_then(|e| *e.next_fire.lock())
    }

    /// Cancel every timer. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        for (_, entry) in &drained {
            entry.handle.abort();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
