// src/errors.rs

//! Crate-wide error type and the user-visible signal each error maps to.

use thiserror::Error;

use crate::types::ScriptId;

#[derive(Error, Debug)]
pub enum LauncherError {
    /// A run was refused because another run of the same script holds the gate.
    #[error("Script {0} is already running")]
    AlreadyRunning(String),

    /// The process could not be started (missing interpreter, bad path, ...).
    #[error("Failed to launch script {script}: {source}")]
    LaunchFailure {
        script: String,
        #[source]
        source: std::io::Error,
    },

    /// Stop requested for an execution that is not running.
    #[error("No running execution: {0}")]
    StopNotApplicable(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Script not found: {0}")]
    ScriptNotFound(ScriptId),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification handed to whatever surface sits in front of the
/// engine (HTTP layer, CLI exit codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSignal {
    Conflict,
    NotFound,
    Invalid,
    Internal,
}

impl LauncherError {
    pub fn signal(&self) -> ErrorSignal {
        match self {
            LauncherError::AlreadyRunning(_) => ErrorSignal::Conflict,
            LauncherError::StopNotApplicable(_)
            | LauncherError::ScriptNotFound(_)
            | LauncherError::ExecutionNotFound(_) => ErrorSignal::NotFound,
            LauncherError::ConfigInvalid(_) => ErrorSignal::Invalid,
            _ => ErrorSignal::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, LauncherError>;
