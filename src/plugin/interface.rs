//! Plugin interface definition.
//!
//! Defines the lifecycle contract every plugin implements and the optional
//! request-handler capability.

use crate::core::ConfigMap;
use crate::routing::Route;
use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Plugin information.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin ID
    pub id: String,
    /// Plugin name
    pub name: String,
    /// Version (semantic versioning by convention)
    pub version: String,
    /// Description
    pub description: String,
}

impl PluginInfo {
    /// Create new plugin info.
    pub fn new(id: &str, name: &str, version: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            description: String::new(),
        }
    }

    /// Set description.
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }
}

/// Context passed to `initialize`.
#[derive(Clone, Debug)]
pub struct PluginContext {
    /// Plugin being initialized
    pub plugin_id: String,
    /// Persisted configuration
    pub config: ConfigMap,
    /// Plugin data directory
    pub data_dir: String,
    /// Is development mode
    pub dev_mode: bool,
}

impl PluginContext {
    /// Create a new context.
    pub fn new(plugin_id: &str, data_dir: &str) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            config: ConfigMap::new(),
            data_dir: data_dir.to_string(),
            dev_mode: false,
        }
    }

    /// Get config value.
    pub fn get_config<T: for<'de> serde::Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.config.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Set config value.
    pub fn set_config(&mut self, key: &str, value: serde_json::Value) {
        self.config.insert(key.to_string(), value);
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Plugin-specific error.
///
/// The registry records `message` as the plugin's last error.
#[derive(Clone, Debug)]
pub struct PluginError {
    /// Error message
    pub message: String,
}

impl PluginError {
    /// Create a new error.
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginError: {}", self.message)
    }
}

impl std::error::Error for PluginError {}

/// A plugin-owned HTTP endpoint.
///
/// The binder only looks at `route()`; the handler itself is opaque.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Method and path this handler answers on.
    fn route(&self) -> Route;

    /// Handle one request.
    async fn handle(&self, request: Request) -> Response;
}

type HandlerFn = dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync;

/// Request handler backed by a closure.
pub struct FnHandler {
    route: Route,
    func: Box<HandlerFn>,
}

impl FnHandler {
    /// Wrap an async closure as a handler for `route`.
    pub fn new<F, Fut>(route: Route, func: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            route,
            func: Box::new(move |request| func(request).boxed()),
        }
    }
}

#[async_trait]
impl RequestHandler for FnHandler {
    fn route(&self) -> Route {
        self.route.clone()
    }

    async fn handle(&self, request: Request) -> Response {
        (self.func)(request).await
    }
}

/// Plugin trait that all plugins must implement.
pub trait Plugin: Send + Sync {
    /// Get plugin info.
    fn info(&self) -> PluginInfo;

    /// Initialize the plugin. Called on enable.
    fn initialize(&mut self, ctx: &PluginContext) -> PluginResult<()>;

    /// Shutdown the plugin. Called on disable.
    fn shutdown(&mut self) -> PluginResult<()>;

    /// Request handlers, for plugins that serve HTTP.
    fn request_handlers(&self) -> Option<Vec<Arc<dyn RequestHandler>>> {
        None
    }

    /// Health check. Called for enabled plugins by the host health endpoint.
    fn health_check(&self) -> PluginResult<bool> {
        Ok(true)
    }
}

/// A discovered plugin, ready for registration.
///
/// Identity and the handler capability are captured once, here, so the
/// registry never has to inspect the plugin's type.
pub struct PluginDescriptor {
    /// Plugin info
    pub info: PluginInfo,
    /// Handlers, when the plugin serves HTTP
    pub request_handlers: Option<Vec<Arc<dyn RequestHandler>>>,
    /// Plugin instance
    pub plugin: Box<dyn Plugin>,
}

impl PluginDescriptor {
    /// Build a descriptor from a plugin instance.
    pub fn new(plugin: Box<dyn Plugin>) -> Self {
        Self {
            info: plugin.info(),
            request_handlers: plugin.request_handlers(),
            plugin,
        }
    }

    /// Plugin ID.
    pub fn id(&self) -> &str {
        &self.info.id
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("info", &self.info)
            .field(
                "request_handlers",
                &self.request_handlers.as_ref().map(|h| h.len()),
            )
            .finish_non_exhaustive()
    }
}

/// A simple example plugin that echoes back a greeting over HTTP.
pub struct EchoPlugin {
    info: PluginInfo,
    initialized: bool,
}

impl EchoPlugin {
    /// Path served by the echo handler.
    pub const PATH: &'static str = "/plugins/echo";

    /// Create a new echo plugin.
    pub fn new() -> Self {
        Self {
            info: PluginInfo::new("echo", "Echo Plugin", "1.0.0")
                .with_description("Answers GET /plugins/echo with its own identity"),
            initialized: false,
        }
    }

    /// Whether `initialize` has run without a matching `shutdown`.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl Default for EchoPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for EchoPlugin {
    fn info(&self) -> PluginInfo {
        self.info.clone()
    }

    fn initialize(&mut self, _ctx: &PluginContext) -> PluginResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) -> PluginResult<()> {
        self.initialized = false;
        Ok(())
    }

    fn request_handlers(&self) -> Option<Vec<Arc<dyn RequestHandler>>> {
        let info = self.info.clone();
        let handler = FnHandler::new(Route::get(Self::PATH), move |_request| {
            let info = info.clone();
            async move { Json(info).into_response() }
        });
        Some(vec![Arc::new(handler)])
    }
}
