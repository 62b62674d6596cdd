//! Plugin host.
//!
//! Owns the registry, route table, store and manager for one process, and
//! serves the admin API next to whatever routes enabled plugins have bound.

use crate::core::{Error, Result};
use crate::host::config::HostConfig;
use crate::management::{admin_router, ApiResponse, PluginManager};
use crate::plugin::{Discoverer, PluginDiscovery, PluginHealth, PluginRegistry};
use crate::routing::route::normalize_path;
use crate::routing::{Route, RouteBinder, RouteTable};
use crate::store::{create_plugin_store, PluginMetadataService, PluginStore};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Path of the host health endpoint.
pub const HEALTH_PATH: &str = "/health";

/// Host health summary.
#[derive(Clone, Debug, Serialize)]
pub struct HostHealth {
    /// Whether the metadata store answered its health check
    pub store: bool,
    /// Stored plugin records, when the store is reachable
    pub records: Option<u64>,
    /// Registered plugins
    pub plugins: usize,
    /// Enabled plugins
    pub enabled: usize,
    /// Plugin-bound routes
    pub routes: usize,
    /// Health checks of enabled plugins
    pub checks: Vec<PluginHealth>,
}

impl HostHealth {
    /// Store reachable and every enabled plugin healthy.
    pub fn is_healthy(&self) -> bool {
        self.store && self.checks.iter().all(|c| c.healthy)
    }
}

/// Plugin host.
pub struct PluginHost {
    config: HostConfig,
    admin_prefix: String,
    table: Arc<RouteTable>,
    registry: Arc<PluginRegistry>,
    manager: PluginManager,
}

impl PluginHost {
    /// Create a host with the store described by its configuration.
    pub fn new(config: HostConfig, discoverers: Vec<Arc<dyn Discoverer>>) -> Result<Self> {
        let store = create_plugin_store(&config.store)?;
        Self::with_store(config, discoverers, store)
    }

    /// Create a host over an existing store.
    pub fn with_store(
        config: HostConfig,
        discoverers: Vec<Arc<dyn Discoverer>>,
        store: Arc<dyn PluginStore>,
    ) -> Result<Self> {
        config.validate()?;
        let admin_prefix = normalize_path(&config.admin_prefix);

        let table = Arc::new(RouteTable::new());
        table.reserve_prefix(&admin_prefix);
        table.reserve(Route::get(HEALTH_PATH));

        let registry = Arc::new(
            PluginRegistry::new(RouteBinder::new(table.clone()))
                .with_data_dir(&config.plugin_data_dir)
                .with_dev_mode(config.dev_mode),
        );
        let discovery = discoverers
            .into_iter()
            .fold(PluginDiscovery::new(registry.clone()), |discovery, d| {
                discovery.with_discoverer(d)
            });
        let manager = PluginManager::new(
            registry.clone(),
            Arc::new(discovery),
            PluginMetadataService::new(store),
        );

        Ok(Self {
            config,
            admin_prefix,
            table,
            registry,
            manager,
        })
    }

    /// Host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Live route table.
    pub fn route_table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    /// Plugin manager.
    pub fn manager(&self) -> &PluginManager {
        &self.manager
    }

    /// Discover plugins, restore previously enabled ones and reconcile the store.
    pub async fn start(&self) -> Result<()> {
        if self.config.discover_on_startup {
            self.manager.discover_plugins().await?;
        }
        if self.config.restore_enabled_on_startup {
            self.manager.restore_enabled().await?;
        }
        let records = self.manager.synchronize_plugins().await?;

        info!(
            plugins = self.registry.len(),
            enabled = self.registry.list_enabled().len(),
            records = records.len(),
            "Plugin host started"
        );
        Ok(())
    }

    /// HTTP router: admin API, health endpoint and plugin dispatch.
    pub fn router(&self) -> Router {
        let table = self.table.clone();
        let manager = self.manager.clone();

        Router::new()
            .nest(&self.admin_prefix, admin_router(self.manager.clone()))
            .route(HEALTH_PATH, get(move || health(manager.clone())))
            .fallback(move |request: Request| dispatch_plugin_request(table.clone(), request))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
    }

    /// Serve until Ctrl-C, then shut plugins down.
    pub async fn serve(&self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then shut plugins down.
    pub async fn serve_with_shutdown<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, admin = %self.admin_prefix, "Plugin host listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await?;

        self.shutdown().await?;
        Ok(())
    }

    /// Disable every enabled plugin.
    ///
    /// Stored records keep their enabled flag so the next start restores them.
    pub async fn shutdown(&self) -> Result<usize> {
        let registry = self.registry.clone();
        let count = tokio::task::spawn_blocking(move || registry.shutdown_all()).await?;
        info!(count, "Plugin host stopped");
        Ok(count)
    }
}

/// 200 when healthy, 503 with the same summary otherwise.
async fn health(manager: PluginManager) -> Response {
    let registry = manager.registry().clone();
    let all = registry.list_all();
    let checks = match tokio::task::spawn_blocking(move || registry.health_report()).await {
        Ok(checks) => checks,
        Err(e) => return Error::from(e).into_response(),
    };

    let store = manager.metadata().store();
    let reachable = match store.health_check().await {
        Ok(reachable) => reachable,
        Err(e) => {
            warn!(error = %e, backend = %store.backend_type(), "Plugin store health check failed");
            false
        }
    };
    let records = if reachable {
        store.count().await.ok()
    } else {
        None
    };

    let health = HostHealth {
        store: reachable,
        records,
        plugins: all.len(),
        enabled: all.iter().filter(|p| p.enabled).count(),
        routes: all.iter().map(|p| p.routes.len()).sum(),
        checks,
    };
    if health.is_healthy() {
        return Json(ApiResponse::success("ok", health)).into_response();
    }
    let body = ApiResponse {
        success: false,
        message: "degraded".to_string(),
        data: Some(health),
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

async fn dispatch_plugin_request(table: Arc<RouteTable>, request: Request) -> Response {
    match table.dispatch(request).await {
        Ok(response) => response,
        Err(request) => {
            let message = format!("No handler for {} {}", request.method(), request.uri().path());
            debug!(%message, "Unmatched request");
            (StatusCode::NOT_FOUND, Json(ApiResponse::<()>::error(&message))).into_response()
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
