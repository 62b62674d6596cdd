//! # Graft - live plugin registry for HTTP services
//!
//! Discovers plugins, drives their lifecycle and grafts their request
//! handlers onto a running router:
//! - **plugin**: plugin contract, registry and discovery
//! - **routing**: copy-on-write route table and binder
//! - **store**: persisted plugin records and reconciliation
//! - **management**: operator façade and admin HTTP API
//! - **host**: server wiring
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graft::host::{HostConfig, PluginHost};
//! use graft::plugin::{Discoverer, EchoPlugin, FactoryDiscoverer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> graft::Result<()> {
//!     let builtin: Arc<dyn Discoverer> =
//!         Arc::new(FactoryDiscoverer::new("builtin").with_default::<EchoPlugin>());
//!     let host = PluginHost::new(HostConfig::default(), vec![builtin])?;
//!     host.start().await?;
//!     host.manager().enable_plugin("echo").await?;
//!     host.serve().await
//! }
//! ```

pub mod core;
pub mod host;
pub mod management;
pub mod monitoring;
pub mod plugin;
pub mod routing;
pub mod store;

pub use core::error::{Error, Result};
