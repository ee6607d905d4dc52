// src/engine/mod.rs

//! Composition root.
//!
//! [`Engine`] wires the record store, the log manager, the run registry and
//! the scheduler together and exposes the operations a management surface
//! (HTTP API, CLI) calls:
//!
//! - script CRUD, each followed by timer reconciliation
//! - manual runs, synchronous or in the background
//! - stop / status queries over executions
//! - log reading and live log subscriptions
//!
//! The state machine of individual runs lives in [`crate::exec`]; the timer
//! rules live in [`crate::schedule`].

pub mod core;
pub mod status;

pub use self::core::Engine;
pub use self::status::ScriptStatus;
