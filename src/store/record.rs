//! Persisted plugin record.
//!
//! Durable shadow of a registry entry.

use crate::core::{now, ConfigMap, Timestamp};
use crate::plugin::RegisteredPlugin;
use serde::{Deserialize, Serialize};

/// A persisted plugin record, keyed by plugin id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRecord {
    /// Plugin ID (primary key)
    pub id: String,
    /// Display name
    pub name: String,
    /// Version
    pub version: String,
    /// Description
    pub description: String,
    /// Activation flag
    pub enabled: bool,
    /// Free-form configuration
    pub config: ConfigMap,
    /// First time the record was written
    pub installed_at: Timestamp,
    /// Last observed disabled -> enabled edge
    pub last_enabled_at: Option<Timestamp>,
    /// Last observed enabled -> disabled edge
    pub last_disabled_at: Option<Timestamp>,
    /// Last hook failure or skipped routes reported by the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PluginRecord {
    /// Create a fresh record for a plugin seen for the first time.
    ///
    /// Creating an enabled record counts as the enable edge.
    pub fn from_registered(plugin: &RegisteredPlugin) -> Self {
        let stamp = now();
        Self {
            id: plugin.info.id.clone(),
            name: plugin.info.name.clone(),
            version: plugin.info.version.clone(),
            description: plugin.info.description.clone(),
            enabled: plugin.enabled,
            config: ConfigMap::new(),
            installed_at: stamp,
            last_enabled_at: plugin.enabled.then_some(stamp),
            last_disabled_at: None,
            last_error: plugin.last_error.clone(),
        }
    }

    /// Refresh from the live plugin, stamping only on enabled-flag edges.
    pub fn apply(&mut self, plugin: &RegisteredPlugin) {
        self.name = plugin.info.name.clone();
        self.version = plugin.info.version.clone();
        self.description = plugin.info.description.clone();
        self.last_error = plugin.last_error.clone();
        self.set_enabled(plugin.enabled);
    }

    /// Set the enabled flag, stamping the matching edge timestamp.
    pub fn set_enabled(&mut self, enabled: bool) {
        match (self.enabled, enabled) {
            (false, true) => self.last_enabled_at = Some(now()),
            (true, false) => self.last_disabled_at = Some(now()),
            _ => {}
        }
        self.enabled = enabled;
    }
}
