// src/store/memory.rs

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::errors::{LauncherError, Result};
use crate::script::{ScriptConfig, ScriptPatch};
use crate::store::{RecordStore, StoreFuture};
use crate::types::ScriptId;

/// In-memory record store keyed by script id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<ScriptId, ScriptConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with records that were already validated.
    pub fn from_configs(configs: impl IntoIterator<Item = ScriptConfig>) -> Self {
        let records = configs.into_iter().map(|c| (c.id, c)).collect();
        Self {
            records: RwLock::new(records),
        }
    }

    fn insert_sync(&self, config: ScriptConfig) -> Result<ScriptConfig> {
        let mut records = self.records.write();
        if records.contains_key(&config.id) {
            return Err(LauncherError::ConfigInvalid(format!(
                "script id {} already exists",
                config.id
            )));
        }
        if records.values().any(|r| r.name == config.name) {
            return Err(LauncherError::ConfigInvalid(format!(
                "script name '{}' already exists",
                config.name
            )));
        }
        debug!(script_id = config.id, name = %config.name, "inserting script record");
        records.insert(config.id, config.clone());
        Ok(config)
    }

    fn update_sync(&self, id: ScriptId, patch: ScriptPatch) -> Result<ScriptConfig> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or(LauncherError::ScriptNotFound(id))?;
        patch.apply(record);
        Ok(record.clone())
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, id: ScriptId) -> StoreFuture<'_, Option<ScriptConfig>> {
        let record = self.records.read().get(&id).cloned();
        Box::pin(async move { Ok(record) })
    }

    fn update(&self, id: ScriptId, patch: ScriptPatch) -> StoreFuture<'_, ScriptConfig> {
        let result = self.update_sync(id, patch);
        Box::pin(async move { result })
    }

    fn list_active(&self) -> StoreFuture<'_, Vec<ScriptConfig>> {
        let active: Vec<_> = self
            .records
            .read()
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        Box::pin(async move { Ok(active) })
    }

    fn list(&self) -> StoreFuture<'_, Vec<ScriptConfig>> {
        let mut all: Vec<_> = self.records.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Box::pin(async move { Ok(all) })
    }

    fn insert(&self, config: ScriptConfig) -> StoreFuture<'_, ScriptConfig> {
        let result = self.insert_sync(config);
        Box::pin(async move { result })
    }

    fn delete(&self, id: ScriptId) -> StoreFuture<'_, bool> {
        let removed = self.records.write().remove(&id).is_some();
        Box::pin(async move { Ok(removed) })
    }
}
