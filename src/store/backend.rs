//! PluginStore trait definition.
//!
//! Key-value persistence for plugin records.

use crate::core::Result;
use crate::store::record::PluginRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Backend type identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Process-local map
    Memory,
    /// SQLite database file
    Sqlite,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Memory => write!(f, "memory"),
            BackendType::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Core trait for plugin record storage.
///
/// Every write is a single-record upsert keyed by plugin id.
#[async_trait]
pub trait PluginStore: Send + Sync {
    /// Insert or replace a record.
    async fn save(&self, record: PluginRecord) -> Result<PluginRecord>;

    /// Read a record by plugin id.
    ///
    /// Returns None if no record exists.
    async fn find(&self, id: &str) -> Result<Option<PluginRecord>>;

    /// Read every record.
    async fn find_all(&self) -> Result<Vec<PluginRecord>>;

    /// Read records marked enabled.
    async fn find_enabled(&self) -> Result<Vec<PluginRecord>> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|r| r.enabled)
            .collect())
    }

    /// Whether a record exists.
    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.find(id).await?.is_some())
    }

    /// Get the backend type.
    fn backend_type(&self) -> BackendType;

    /// Health check for the backend.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Get record count.
    async fn count(&self) -> Result<u64> {
        Ok(self.find_all().await?.len() as u64)
    }
}
