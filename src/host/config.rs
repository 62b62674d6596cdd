//! Host configuration.

use crate::core::{Error, Result};
use crate::management::DEFAULT_ADMIN_PREFIX;
use crate::monitoring::LoggingConfig;
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Plugin host configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Listen address
    pub bind_addr: String,
    /// Mount point of the admin API
    pub admin_prefix: String,
    /// Run discovery when the host starts
    pub discover_on_startup: bool,
    /// Re-enable plugins whose record says enabled
    pub restore_enabled_on_startup: bool,
    /// Base directory for plugin data
    pub plugin_data_dir: String,
    /// Development mode, passed to plugins
    pub dev_mode: bool,
    /// Metadata store
    pub store: StoreConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl HostConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the listen address.
    pub fn with_bind_addr(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Set the metadata store.
    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Check field values.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| Error::Config(format!("bind_addr {:?}: {}", self.bind_addr, e)))?;

        let prefix = self.admin_prefix.trim_end_matches('/');
        if !prefix.starts_with('/') || prefix.contains(char::is_whitespace) {
            return Err(Error::Config(format!(
                "admin_prefix {:?} must be an absolute path below the root",
                self.admin_prefix
            )));
        }
        // The router would read these as path captures or wildcards.
        if prefix.contains([':', '*']) {
            return Err(Error::Config(format!(
                "admin_prefix {:?} must not contain ':' or '*'",
                self.admin_prefix
            )));
        }
        Ok(())
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            discover_on_startup: true,
            restore_enabled_on_startup: true,
            plugin_data_dir: "data/plugins".to_string(),
            dev_mode: false,
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::LogFormat;
    use crate::store::BackendType;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = HostConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.admin_prefix, "/api/v1/admin/plugins");
        assert_eq!(config.store.backend, BackendType::Sqlite);
    }

    #[test]
    fn test_from_file_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "bind_addr": "0.0.0.0:9000",
                "store": {{ "backend": "memory" }},
                "logging": {{ "format": "json" }}
            }}"#
        )
        .unwrap();

        let config = HostConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.store.backend, BackendType::Memory);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.discover_on_startup);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            HostConfig::default().with_bind_addr("not an address").validate(),
            Err(Error::Config(_))
        ));

        let mut config = HostConfig::default();
        config.admin_prefix = "/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admin_prefix_rejects_route_syntax() {
        for prefix in ["/admin/:id", "/admin/*rest", "/ad:min", "/admin*"] {
            let mut config = HostConfig::default();
            config.admin_prefix = prefix.to_string();
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "{} should be rejected",
                prefix
            );
        }

        let mut config = HostConfig::default();
        config.admin_prefix = "/ops/plugins/".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            HostConfig::from_file("/nonexistent/graft.json"),
            Err(Error::Io(_))
        ));
    }
}
