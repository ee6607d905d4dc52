// src/config/mod.rs

//! Configuration loading and validation.
//!
//! - [`model`] defines the TOML-backed data model.
//! - [`loader`] reads a file from disk and applies environment overrides.
//! - [`validate`] turns the raw model into checked [`ScriptConfig`]s.
//!
//! [`ScriptConfig`]: crate::script::ScriptConfig

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigFile, EngineSection, RawConfigFile, RawScriptConfig, RawWeekdays};
