// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

pub const ENV_LOGS_DIR: &str = "SCRIPT_LAUNCHER_LOGS_DIR";
pub const ENV_INTERPRETER: &str = "SCRIPT_LAUNCHER_INTERPRETER";

/// Load a configuration file and return the raw, unvalidated model.
///
/// Environment overrides are applied; semantic validation is not. Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let mut config: RawConfigFile = toml::from_str(&contents)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Load and validate a configuration file. This is the entry point the
/// binary uses.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Parse and validate TOML text. No environment overrides.
pub fn load_from_str(contents: &str) -> Result<ConfigFile> {
    let raw_config: RawConfigFile = toml::from_str(contents)?;
    ConfigFile::try_from(raw_config)
}

/// Override `[engine]` values from `SCRIPT_LAUNCHER_*` variables.
pub fn apply_env_overrides<F>(config: &mut RawConfigFile, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_LOGS_DIR) {
        debug!(logs_dir = %dir, "logs_dir overridden from environment");
        config.engine.logs_dir = PathBuf::from(dir);
    }
    if let Some(interpreter) = lookup(ENV_INTERPRETER) {
        debug!(%interpreter, "interpreter overridden from environment");
        config.engine.interpreter = interpreter;
    }
}

/// `ScriptLauncher.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("ScriptLauncher.toml")
}
