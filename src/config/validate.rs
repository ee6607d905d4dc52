// src/config/validate.rs

use std::collections::BTreeSet;

use crate::config::model::{ConfigFile, EngineSection, RawConfigFile, RawScriptConfig, RawWeekdays};
use crate::errors::{LauncherError, Result};
use crate::script::ScriptConfig;
use crate::types::{ScheduledAt, ScriptId, WeekdayFilter};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = LauncherError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_engine(&raw.engine)?;
        let scripts = build_scripts(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.engine, scripts))
    }
}

fn validate_engine(engine: &EngineSection) -> Result<()> {
    if engine.stop_grace_secs == 0 {
        return Err(LauncherError::ConfigInvalid(
            "[engine].stop_grace_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    if engine.subscriber_buffer == 0 {
        return Err(LauncherError::ConfigInvalid(
            "[engine].subscriber_buffer must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn build_scripts(raw: &RawConfigFile) -> Result<Vec<ScriptConfig>> {
    let mut used = BTreeSet::new();
    for (name, script) in &raw.script {
        if let Some(id) = script.id {
            if !used.insert(id) {
                return Err(LauncherError::ConfigInvalid(format!(
                    "script '{name}' reuses id {id}"
                )));
            }
        }
    }

    let mut next_id = used.last().map_or(1, |max| max + 1);
    let mut scripts = Vec::with_capacity(raw.script.len());
    for (name, script) in &raw.script {
        let id = script.id.unwrap_or_else(|| {
            let id = next_id;
            next_id += 1;
            id
        });
        let config = build_script(id, name, script)?;
        config.validate()?;
        scripts.push(config);
    }

    scripts.sort_by_key(|s| s.id);
    Ok(scripts)
}

fn build_script(id: ScriptId, name: &str, raw: &RawScriptConfig) -> Result<ScriptConfig> {
    let interval_value = raw
        .interval_value
        .map(|value| {
            u32::try_from(value).ok().filter(|v| *v >= 1).ok_or_else(|| {
                LauncherError::ConfigInvalid(format!(
                    "script '{name}': interval_value must be >= 1 (got {value})"
                ))
            })
        })
        .transpose()?;

    let weekdays = match &raw.weekdays {
        None => WeekdayFilter::every_day(),
        Some(RawWeekdays::List(days)) => {
            WeekdayFilter::try_from_days(days).map_err(|e| in_script(name, e))?
        }
        Some(RawWeekdays::Persisted(text)) => WeekdayFilter::from_persisted(text),
    };

    let scheduled_start_at = raw
        .scheduled_start_at
        .as_deref()
        .map(ScheduledAt::parse)
        .transpose()
        .map_err(|e| in_script(name, e))?;

    let mut config = ScriptConfig::new(id, name, raw.path.clone());
    config.description = raw.description.clone();
    config.is_active = raw.is_active;
    config.repeat_enabled = raw.repeat_enabled;
    config.interval_value = interval_value;
    config.interval_unit = raw.interval_unit;
    config.weekdays = weekdays;
    config.scheduled_start_enabled = raw.scheduled_start_enabled;
    config.scheduled_start_at = scheduled_start_at;
    Ok(config)
}

/// Prefix a validation message with the script it is about.
fn in_script(name: &str, error: LauncherError) -> LauncherError {
    match error {
        LauncherError::ConfigInvalid(msg) => {
            LauncherError::ConfigInvalid(format!("script '{name}': {msg}"))
        }
        other => other,
    }
}
