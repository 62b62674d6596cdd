//! Store factory.
//!
//! Creates plugin stores based on configuration.

use crate::core::Result;
use crate::store::backend::{BackendType, PluginStore};
use crate::store::backends::{MemoryStore, SqliteStore};
use crate::store::config::StoreConfig;
use std::sync::Arc;

/// Create a plugin store from configuration.
pub fn create_plugin_store(config: &StoreConfig) -> Result<Arc<dyn PluginStore>> {
    match config.backend {
        BackendType::Memory => Ok(Arc::new(MemoryStore::new())),
        BackendType::Sqlite => {
            let sqlite_config = config.sqlite.clone().unwrap_or_default();
            Ok(Arc::new(SqliteStore::new(&sqlite_config)?))
        }
    }
}
