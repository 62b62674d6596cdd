//! Plugin store configuration.
//!
//! Configuration-driven backend selection.

use crate::store::backend::BackendType;
use serde::{Deserialize, Serialize};

/// Store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend type to use
    pub backend: BackendType,
    /// SQLite-specific config
    pub sqlite: Option<SqliteConfig>,
}

impl StoreConfig {
    /// In-memory store (state is lost on restart).
    pub fn memory() -> Self {
        Self {
            backend: BackendType::Memory,
            sqlite: None,
        }
    }

    /// SQLite store at `path`.
    pub fn sqlite(path: &str) -> Self {
        Self {
            backend: BackendType::Sqlite,
            sqlite: Some(SqliteConfig {
                path: path.to_string(),
            }),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::sqlite(&SqliteConfig::default().path)
    }
}

/// SQLite backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file; `:memory:` for a private in-memory database
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "data/plugins.db".to_string(),
        }
    }
}
