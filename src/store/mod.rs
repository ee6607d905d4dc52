// src/store/mod.rs

//! Record store abstraction.
//!
//! The engine never owns script records; it reads and patches them through
//! [`RecordStore`]. [`MemoryStore`] is the bundled implementation used by the
//! binary (seeded from the config file) and by tests.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::script::{ScriptConfig, ScriptPatch};
use crate::types::ScriptId;

pub mod memory;

pub use memory::MemoryStore;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

pub trait RecordStore: Send + Sync {
    /// Fetch a single record, `None` if it does not exist.
    fn get(&self, id: ScriptId) -> StoreFuture<'_, Option<ScriptConfig>>;

    /// Apply `patch` to an existing record and return the updated record.
    fn update(&self, id: ScriptId, patch: ScriptPatch) -> StoreFuture<'_, ScriptConfig>;

    /// All records with `is_active = true`.
    fn list_active(&self) -> StoreFuture<'_, Vec<ScriptConfig>>;

    /// All records, ordered by name.
    fn list(&self) -> StoreFuture<'_, Vec<ScriptConfig>>;

    fn insert(&self, config: ScriptConfig) -> StoreFuture<'_, ScriptConfig>;

    /// Remove a record. Returns `false` if it did not exist.
    fn delete(&self, id: ScriptId) -> StoreFuture<'_, bool>;
}
