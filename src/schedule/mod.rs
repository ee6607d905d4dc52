// src/schedule/mod.rs

//! Time-based triggering.
//!
//! - [`lifecycle`] holds the pure rules deciding whether a script stays
//!   active and which timers it should have.
//! - [`timers`] stores the per-script timer handles (one map for recurring
//!   timers, one for one-shot timers).
//! - [`scheduler`] is the service that owns those timers, fires runs through
//!   the [`RunRegistry`](crate::exec::RunRegistry) and does the post-run
//!   bookkeeping.
//! - [`clock`] abstracts "now" so firing decisions can be tested.

pub mod clock;
pub mod lifecycle;
pub mod scheduler;
pub mod timers;

pub use clock::{Clock, SystemClock};
pub use lifecycle::{PostFireAction, StartupDecision, TimerPlan};
pub use scheduler::{FireOutcome, Scheduler, SchedulerOptions, StartupReport};
