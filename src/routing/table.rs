//! Live route table.
//!
//! Holds the plugin-owned handler bindings the running server dispatches to.
//! The table is copy-on-write: writers clone the current map, edit the clone
//! and swap it in under the write lock, so a request always resolves against
//! one complete generation of the table.

use crate::plugin::interface::RequestHandler;
use crate::routing::route::{normalize_path, Route};
use axum::extract::Request;
use axum::http::Method;
use axum::response::Response;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Who owns a route.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOwner {
    /// Reserved by the host application
    Host,
    /// Bound by a plugin
    Plugin(String),
}

impl std::fmt::Display for RouteOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteOwner::Host => write!(f, "host"),
            RouteOwner::Plugin(id) => write!(f, "plugin {}", id),
        }
    }
}

/// A handler bound into the table.
#[derive(Clone)]
pub struct BoundRoute {
    /// Owning plugin
    pub plugin_id: String,
    /// Handler instance
    pub handler: Arc<dyn RequestHandler>,
}

impl std::fmt::Debug for BoundRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundRoute")
            .field("plugin_id", &self.plugin_id)
            .finish_non_exhaustive()
    }
}

/// One generation of the table.
#[derive(Clone, Default)]
pub(crate) struct RouteMap {
    pub(crate) bound: HashMap<Route, BoundRoute>,
    pub(crate) reserved: HashSet<Route>,
    pub(crate) reserved_prefixes: Vec<String>,
}

impl RouteMap {
    pub(crate) fn owner_of(&self, route: &Route) -> Option<RouteOwner> {
        if self.reserved.contains(route) || self.reserved_prefixes.iter().any(|p| route.is_under(p)) {
            return Some(RouteOwner::Host);
        }
        self.bound
            .get(route)
            .map(|b| RouteOwner::Plugin(b.plugin_id.clone()))
    }
}

/// Route table shared between the binder and the request path.
#[derive(Default)]
pub struct RouteTable {
    current: RwLock<Arc<RouteMap>>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a single host route.
    pub fn reserve(&self, route: Route) {
        self.update(|map| {
            map.reserved.insert(route);
        });
    }

    /// Reserve every route under a path prefix.
    pub fn reserve_prefix(&self, prefix: &str) {
        let prefix = normalize_path(prefix);
        self.update(|map| {
            if !map.reserved_prefixes.contains(&prefix) {
                map.reserved_prefixes.push(prefix);
            }
        });
    }

    /// Current owner of a route, if any.
    pub fn owner(&self, route: &Route) -> Option<RouteOwner> {
        self.snapshot().owner_of(route)
    }

    /// Find the handler bound to a method and path.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<BoundRoute> {
        let route = Route::new(method.clone(), path);
        self.snapshot().bound.get(&route).cloned()
    }

    /// Routes currently bound by a plugin, sorted by path then method.
    pub fn routes_for(&self, plugin_id: &str) -> Vec<Route> {
        let mut routes: Vec<Route> = self
            .snapshot()
            .bound
            .iter()
            .filter(|(_, b)| b.plugin_id == plugin_id)
            .map(|(route, _)| route.clone())
            .collect();
        routes.sort_by(|a, b| (&a.path, a.method.as_str()).cmp(&(&b.path, b.method.as_str())));
        routes
    }

    /// Number of plugin-bound routes.
    pub fn len(&self) -> usize {
        self.snapshot().bound.len()
    }

    /// Whether no plugin routes are bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch a request to the bound handler.
    ///
    /// Returns the request back when nothing is bound for it.
    pub async fn dispatch(&self, request: Request) -> std::result::Result<Response, Request> {
        let bound = self.lookup(request.method(), request.uri().path());
        match bound {
            Some(bound) => {
                tracing::debug!(
                    plugin_id = %bound.plugin_id,
                    method = %request.method(),
                    path = %request.uri().path(),
                    "Dispatching plugin request"
                );
                Ok(bound.handler.handle(request).await)
            }
            None => Err(request),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<RouteMap> {
        self.current.read().clone()
    }

    /// Apply an edit to a fresh copy of the map and publish it.
    pub(crate) fn update<R>(&self, edit: impl FnOnce(&mut RouteMap) -> R) -> R {
        let mut current = self.current.write();
        let mut next = RouteMap::clone(&current);
        let result = edit(&mut next);
        *current = Arc::new(next);
        result
    }
}
