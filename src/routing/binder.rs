//! Route binder.
//!
//! Grafts a plugin's request handlers onto the live route table and takes
//! them off again. A plugin's whole handler set is published in one table
//! generation.

use crate::core::Error;
use crate::plugin::interface::RequestHandler;
use crate::routing::route::Route;
use crate::routing::table::{BoundRoute, RouteTable};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Result of binding one plugin's handlers.
#[derive(Debug, Default)]
pub struct BindOutcome {
    /// Routes now served by the plugin
    pub bound: Vec<Route>,
    /// Handlers that were skipped, with the reason
    pub skipped: Vec<Error>,
}

impl BindOutcome {
    /// Whether every handler was bound.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Binds and unbinds plugin handlers.
pub struct RouteBinder {
    table: Arc<RouteTable>,
}

impl RouteBinder {
    /// Create a binder over a table.
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self { table }
    }

    /// The table this binder writes to.
    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    /// Bind a plugin's handlers, replacing any routes it already had.
    ///
    /// Conflicting or malformed handlers are skipped and reported; the rest
    /// are still bound.
    pub fn bind(&self, plugin_id: &str, handlers: &[Arc<dyn RequestHandler>]) -> BindOutcome {
        let outcome = self.table.update(|map| {
            map.bound.retain(|_, b| b.plugin_id != plugin_id);

            let mut outcome = BindOutcome::default();
            let mut claimed = HashSet::new();
            for handler in handlers {
                let route = handler.route();
                if let Err(e) = route.validate() {
                    outcome.skipped.push(e);
                    continue;
                }
                if claimed.contains(&route) {
                    outcome.skipped.push(Error::BindingConflict {
                        route: route.to_string(),
                        owner: format!("plugin {}", plugin_id),
                    });
                    continue;
                }
                if let Some(owner) = map.owner_of(&route) {
                    outcome.skipped.push(Error::BindingConflict {
                        route: route.to_string(),
                        owner: owner.to_string(),
                    });
                    continue;
                }
                map.bound.insert(
                    route.clone(),
                    BoundRoute {
                        plugin_id: plugin_id.to_string(),
                        handler: handler.clone(),
                    },
                );
                claimed.insert(route.clone());
                outcome.bound.push(route);
            }
            outcome
        });

        for err in &outcome.skipped {
            error!(plugin_id, error = %err, "Skipping plugin route");
        }
        info!(
            plugin_id,
            bound = outcome.bound.len(),
            skipped = outcome.skipped.len(),
            "Bound plugin routes"
        );
        outcome
    }

    /// Remove every route owned by a plugin. Returns how many were removed.
    pub fn unbind(&self, plugin_id: &str) -> usize {
        let removed = self.table.update(|map| {
            let before = map.bound.len();
            map.bound.retain(|_, b| b.plugin_id != plugin_id);
            before - map.bound.len()
        });
        if removed > 0 {
            info!(plugin_id, removed, "Unbound plugin routes");
        }
        removed
    }
}
