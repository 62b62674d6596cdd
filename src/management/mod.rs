//! Management Module
//!
//! Operator surface over the plugin system:
//! - `PluginManager` orchestration
//! - Admin HTTP API with a uniform response envelope

pub mod api;
pub mod manager;

pub use api::{admin_router, status_for, ApiResponse, DEFAULT_ADMIN_PREFIX, RETRY_AFTER_SECS};
pub use manager::PluginManager;
