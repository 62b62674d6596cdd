//! Plugin Module
//!
//! Provides extensible plugin architecture:
//! - Plugin interface
//! - Plugin registry
//! - Discovery

pub mod discovery;
pub mod interface;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use discovery::{Discoverer, FactoryDiscoverer, PluginDiscovery};
pub use interface::{
    EchoPlugin, FnHandler, Plugin, PluginContext, PluginDescriptor, PluginError, PluginInfo,
    PluginResult, RequestHandler,
};
pub use registry::{PluginHealth, PluginRegistry, PluginStatus, RegisteredPlugin};
