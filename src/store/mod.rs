//! Plugin Metadata Store
//!
//! Trait-based persistence for plugin records:
//! - Memory and SQLite backends
//! - Config-driven factory
//! - Reconciliation against the live registry

pub mod backend;
pub mod backends;
pub mod config;
pub mod factory;
pub mod metadata;
pub mod record;

pub use backend::{BackendType, PluginStore};
pub use backends::{MemoryStore, SqliteStore};
pub use config::{SqliteConfig, StoreConfig};
pub use factory::create_plugin_store;
pub use metadata::PluginMetadataService;
pub use record::PluginRecord;
