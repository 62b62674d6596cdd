//! Host Module
//!
//! Wires the plugin system into a running HTTP server:
//! - Host configuration
//! - Startup discovery, restore and reconciliation
//! - Admin API plus plugin dispatch

pub mod config;
pub mod server;

pub use config::HostConfig;
pub use server::{HostHealth, PluginHost, HEALTH_PATH};
