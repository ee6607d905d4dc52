// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`command`] builds the `tokio::process::Command` for a script.
//! - [`output`] drains stdout/stderr line by line into the log sink.
//! - [`runner`] owns one child process from spawn to reap, including
//!   graceful termination on stop.
//! - [`execution`] holds the in-memory execution record.
//! - [`registry`] tracks executions and enforces one run per script.

pub mod command;
pub mod execution;
pub mod output;
pub mod registry;
pub mod runner;

pub use execution::{Execution, ExecutionId};
pub use registry::RunRegistry;
pub use runner::{ProcessRunner, RunnerOptions, SIGNAL_EXIT_CODE};
