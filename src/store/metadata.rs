//! Plugin metadata reconciliation.
//!
//! Keeps persisted records in line with the live registry. Enabled/disabled
//! timestamps are edge-triggered: they move only when the stored flag flips.

use crate::core::{ConfigMap, Error, Result};
use crate::plugin::RegisteredPlugin;
use crate::store::backend::PluginStore;
use crate::store::record::PluginRecord;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Reads and reconciles plugin records.
#[derive(Clone)]
pub struct PluginMetadataService {
    store: Arc<dyn PluginStore>,
}

impl PluginMetadataService {
    /// Create a service over a store.
    pub fn new(store: Arc<dyn PluginStore>) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn PluginStore> {
        &self.store
    }

    /// All records.
    pub async fn list(&self) -> Result<Vec<PluginRecord>> {
        self.store.find_all().await
    }

    /// Record by id.
    pub async fn get(&self, id: &str) -> Result<Option<PluginRecord>> {
        self.store.find(id).await
    }

    /// Records marked enabled.
    pub async fn list_enabled(&self) -> Result<Vec<PluginRecord>> {
        self.store.find_enabled().await
    }

    /// Whether a record exists for the id.
    pub async fn is_installed(&self, id: &str) -> Result<bool> {
        self.store.exists(id).await
    }

    /// Whether the stored record is enabled. Missing records count as disabled.
    pub async fn is_enabled(&self, id: &str) -> Result<bool> {
        Ok(self.store.find(id).await?.map_or(false, |r| r.enabled))
    }

    /// Create or refresh the record for a live plugin.
    pub async fn upsert_from_descriptor(&self, plugin: &RegisteredPlugin) -> Result<PluginRecord> {
        let existing = self.store.find(plugin.id()).await?;
        self.store.save(merge(existing, plugin)).await
    }

    /// Full reconciliation pass.
    ///
    /// Upserts a record for every live plugin, then force-disables enabled
    /// records whose plugin is no longer live. Reading the existing records
    /// must succeed; individual writes are best-effort. Returns every record
    /// written.
    pub async fn synchronize(&self, live: &[RegisteredPlugin]) -> Result<Vec<PluginRecord>> {
        let mut existing: HashMap<String, PluginRecord> = self
            .store
            .find_all()
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        let live_ids: HashSet<&str> = live.iter().map(|p| p.id()).collect();

        let mut written = Vec::new();
        let mut failures = 0usize;

        for plugin in live {
            let record = merge(existing.remove(plugin.id()), plugin);
            match self.store.save(record).await {
                Ok(record) => written.push(record),
                Err(e) => {
                    failures += 1;
                    error!(plugin_id = plugin.id(), error = %e, "Failed to persist plugin record");
                }
            }
        }

        let mut vanished: Vec<PluginRecord> = existing
            .into_values()
            .filter(|r| r.enabled && !live_ids.contains(r.id.as_str()))
            .collect();
        vanished.sort_by(|a, b| a.id.cmp(&b.id));

        for mut record in vanished {
            warn!(plugin_id = %record.id, "Enabled plugin is no longer discovered, marking disabled");
            record.set_enabled(false);
            let id = record.id.clone();
            match self.store.save(record).await {
                Ok(record) => written.push(record),
                Err(e) => {
                    failures += 1;
                    error!(plugin_id = %id, error = %e, "Failed to persist plugin record");
                }
            }
        }

        info!(written = written.len(), failures, "Plugin records synchronized");
        Ok(written)
    }

    /// Mark a stored record disabled, if one exists.
    pub async fn mark_disabled(&self, id: &str) -> Result<Option<PluginRecord>> {
        match self.store.find(id).await? {
            Some(mut record) => {
                record.set_enabled(false);
                self.store.save(record).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Replace a plugin's stored configuration.
    pub async fn update_config(&self, id: &str, config: ConfigMap) -> Result<PluginRecord> {
        let mut record = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        record.config = config;
        self.store.save(record).await
    }
}

fn merge(existing: Option<PluginRecord>, plugin: &RegisteredPlugin) -> PluginRecord {
    match existing {
        Some(mut record) => {
            record.apply(plugin);
            record
        }
        None => PluginRecord::from_registered(plugin),
    }
}
