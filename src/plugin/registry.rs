//! Plugin registry for managing plugins.
//!
//! Process-wide catalog of discovered plugins and the single writer of their
//! enabled state. Each entry carries its own lifecycle lock, so a slow
//! `initialize` or `shutdown` only blocks transitions of that one plugin; the
//! id map itself is held just long enough to clone an entry handle.

use crate::core::{now, ConfigMap, Error, Result, Timestamp};
use crate::plugin::interface::{
    Plugin, PluginContext, PluginDescriptor, PluginInfo, PluginResult, RequestHandler,
};
use crate::routing::{Route, RouteBinder};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Plugin status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PluginStatus {
    /// Registered, never enabled
    Registered,
    /// Active
    Enabled,
    /// Disabled after having been enabled
    Disabled,
}

/// Snapshot of a registered plugin.
#[derive(Clone, Debug, Serialize)]
pub struct RegisteredPlugin {
    /// Plugin info
    pub info: PluginInfo,
    /// Current status
    pub status: PluginStatus,
    /// Activation flag
    pub enabled: bool,
    /// Whether the plugin provides request handlers
    pub serves_http: bool,
    /// Routes currently bound for the plugin
    pub routes: Vec<Route>,
    /// Last hook failure, or the routes skipped on the last enable
    pub last_error: Option<String>,
    /// Registration time
    pub registered_at: Timestamp,
}

impl RegisteredPlugin {
    /// Plugin ID.
    pub fn id(&self) -> &str {
        &self.info.id
    }
}

/// Result of one plugin's health check.
#[derive(Clone, Debug, Serialize)]
pub struct PluginHealth {
    /// Plugin ID
    pub id: String,
    /// Whether the plugin reported healthy
    pub healthy: bool,
    /// Why the check failed, when it returned an error or panicked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct SlotState {
    status: PluginStatus,
    last_error: Option<String>,
    config: ConfigMap,
    removed: bool,
}

struct PluginSlot {
    info: PluginInfo,
    handlers: Option<Vec<Arc<dyn RequestHandler>>>,
    plugin: Mutex<Box<dyn Plugin>>,
    state: RwLock<SlotState>,
    registered_at: Timestamp,
}

impl PluginSlot {
    fn is_enabled(&self) -> bool {
        self.state.read().status == PluginStatus::Enabled
    }
}

/// Plugin registry.
pub struct PluginRegistry {
    /// Registered plugins
    plugins: RwLock<HashMap<String, Arc<PluginSlot>>>,
    /// Route binder for HTTP-capable plugins
    binder: RouteBinder,
    /// Base data directory handed to plugins
    data_dir: String,
    /// Development mode flag handed to plugins
    dev_mode: bool,
}

impl PluginRegistry {
    /// Create a new registry.
    pub fn new(binder: RouteBinder) -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            binder,
            data_dir: "data/plugins".to_string(),
            dev_mode: false,
        }
    }

    /// Set the data directory plugins receive.
    pub fn with_data_dir(mut self, data_dir: &str) -> Self {
        self.data_dir = data_dir.to_string();
        self
    }

    /// Set development mode.
    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// The binder used for HTTP-capable plugins.
    pub fn binder(&self) -> &RouteBinder {
        &self.binder
    }

    /// Register a plugin.
    ///
    /// Returns false and leaves the live entry untouched if the id is taken.
    pub fn register(&self, descriptor: PluginDescriptor) -> bool {
        let id = descriptor.info.id.clone();
        let mut plugins = self.plugins.write();

        if plugins.contains_key(&id) {
            warn!(plugin_id = %id, "Plugin is already registered, ignoring");
            return false;
        }

        info!(plugin_id = %id, name = %descriptor.info.name, version = %descriptor.info.version, "Registering plugin");
        plugins.insert(
            id,
            Arc::new(PluginSlot {
                info: descriptor.info,
                handlers: descriptor.request_handlers,
                plugin: Mutex::new(descriptor.plugin),
                state: RwLock::new(SlotState {
                    status: PluginStatus::Registered,
                    last_error: None,
                    config: ConfigMap::new(),
                    removed: false,
                }),
                registered_at: now(),
            }),
        );
        true
    }

    /// Get plugin by ID.
    pub fn get(&self, plugin_id: &str) -> Option<RegisteredPlugin> {
        self.slot(plugin_id).map(|slot| self.snapshot(&slot))
    }

    /// Whether a plugin is registered.
    pub fn contains(&self, plugin_id: &str) -> bool {
        self.plugins.read().contains_key(plugin_id)
    }

    /// List all plugins.
    pub fn list_all(&self) -> Vec<RegisteredPlugin> {
        self.slots().iter().map(|slot| self.snapshot(slot)).collect()
    }

    /// List enabled plugins.
    pub fn list_enabled(&self) -> Vec<RegisteredPlugin> {
        self.list_all().into_iter().filter(|p| p.enabled).collect()
    }

    /// Get plugin count.
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    /// Whether no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the configuration handed to the plugin's next `initialize`.
    pub fn configure(&self, plugin_id: &str, config: ConfigMap) -> Result<()> {
        let slot = self.require(plugin_id)?;
        slot.state.write().config = config;
        Ok(())
    }

    /// Enable a plugin: run `initialize`, then bind its handlers.
    ///
    /// A failed `initialize` leaves the plugin not enabled with no routes bound.
    /// Handlers the binder skips do not fail the enable; their errors are kept
    /// in `last_error`.
    pub fn enable(&self, plugin_id: &str) -> Result<()> {
        let slot = self.require(plugin_id)?;
        let mut plugin = slot.plugin.lock();

        let ctx = {
            let state = slot.state.read();
            if state.removed {
                return Err(Error::NotFound(plugin_id.to_string()));
            }
            if state.status == PluginStatus::Enabled {
                debug!(plugin_id, "Plugin already enabled");
                return Ok(());
            }
            PluginContext {
                plugin_id: plugin_id.to_string(),
                config: state.config.clone(),
                data_dir: format!("{}/{}", self.data_dir, plugin_id),
                dev_mode: self.dev_mode,
            }
        };

        info!(plugin_id, name = %slot.info.name, "Enabling plugin");
        if let Err(reason) = run_hook(|| plugin.initialize(&ctx)) {
            error!(plugin_id, %reason, "Plugin initialize failed");
            slot.state.write().last_error = Some(reason.clone());
            return Err(Error::ActivationFailure {
                id: plugin_id.to_string(),
                reason,
            });
        }

        let skipped = slot.handlers.as_ref().and_then(|handlers| {
            let outcome = self.binder.bind(plugin_id, handlers);
            (!outcome.is_complete()).then(|| {
                outcome
                    .skipped
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
        });

        let mut state = slot.state.write();
        state.status = PluginStatus::Enabled;
        state.last_error = skipped;
        Ok(())
    }

    /// Disable a plugin: unbind its handlers, then run `shutdown`.
    ///
    /// A failing `shutdown` is logged; the plugin is disabled regardless.
    pub fn disable(&self, plugin_id: &str) -> Result<()> {
        let slot = self.require(plugin_id)?;
        let mut plugin = slot.plugin.lock();

        {
            let state = slot.state.read();
            if state.removed {
                return Err(Error::NotFound(plugin_id.to_string()));
            }
            if state.status != PluginStatus::Enabled {
                debug!(plugin_id, "Plugin not enabled, nothing to disable");
                return Ok(());
            }
        }

        self.deactivate(&slot, &mut **plugin);
        Ok(())
    }

    /// Remove a plugin, disabling it first if needed.
    pub fn remove(&self, plugin_id: &str) -> Result<()> {
        let slot = self.require(plugin_id)?;
        let mut plugin = slot.plugin.lock();

        if slot.state.read().removed {
            return Err(Error::NotFound(plugin_id.to_string()));
        }
        if slot.is_enabled() {
            self.deactivate(&slot, &mut **plugin);
        }
        slot.state.write().removed = true;

        let mut plugins = self.plugins.write();
        if plugins
            .get(plugin_id)
            .map_or(false, |current| Arc::ptr_eq(current, &slot))
        {
            plugins.remove(plugin_id);
        }
        info!(plugin_id, "Removed plugin");
        Ok(())
    }

    /// Disable every enabled plugin. Returns how many were disabled.
    pub fn shutdown_all(&self) -> usize {
        let mut count = 0;
        for slot in self.slots() {
            let mut plugin = slot.plugin.lock();
            if slot.is_enabled() {
                self.deactivate(&slot, &mut **plugin);
                count += 1;
            }
        }
        if count > 0 {
            info!(count, "Shut down enabled plugins");
        }
        count
    }

    /// Run `health_check` on every enabled plugin. Sorted by id.
    ///
    /// A check that errors or panics counts as unhealthy.
    pub fn health_report(&self) -> Vec<PluginHealth> {
        let mut report: Vec<PluginHealth> = self
            .slots()
            .into_iter()
            .filter_map(|slot| {
                let plugin = slot.plugin.lock();
                if !slot.is_enabled() {
                    return None;
                }
                let (healthy, error) =
                    match std::panic::catch_unwind(AssertUnwindSafe(|| plugin.health_check())) {
                        Ok(Ok(healthy)) => (healthy, None),
                        Ok(Err(e)) => (false, Some(e.message)),
                        Err(panic) => (false, Some(panic_message(panic.as_ref()))),
                    };
                if !healthy {
                    warn!(plugin_id = %slot.info.id, error = ?error, "Plugin health check failed");
                }
                Some(PluginHealth {
                    id: slot.info.id.clone(),
                    healthy,
                    error,
                })
            })
            .collect();
        report.sort_by(|a, b| a.id.cmp(&b.id));
        report
    }

    /// Caller must hold the slot's lifecycle lock.
    fn deactivate(&self, slot: &PluginSlot, plugin: &mut dyn Plugin) {
        let plugin_id = slot.info.id.as_str();
        info!(plugin_id, name = %slot.info.name, "Disabling plugin");

        if slot.handlers.is_some() {
            self.binder.unbind(plugin_id);
        }

        let failure = run_hook(|| plugin.shutdown()).err();
        if let Some(reason) = &failure {
            let err = Error::DeactivationFailure {
                id: plugin_id.to_string(),
                reason: reason.clone(),
            };
            warn!(plugin_id, error = %err, "Plugin shutdown failed, disabling anyway");
        }

        let mut state = slot.state.write();
        state.status = PluginStatus::Disabled;
        state.last_error = failure;
    }

    fn slot(&self, plugin_id: &str) -> Option<Arc<PluginSlot>> {
        self.plugins.read().get(plugin_id).cloned()
    }

    fn require(&self, plugin_id: &str) -> Result<Arc<PluginSlot>> {
        self.slot(plugin_id)
            .ok_or_else(|| Error::NotFound(plugin_id.to_string()))
    }

    fn slots(&self) -> Vec<Arc<PluginSlot>> {
        self.plugins.read().values().cloned().collect()
    }

    fn snapshot(&self, slot: &PluginSlot) -> RegisteredPlugin {
        let state = slot.state.read();
        let enabled = state.status == PluginStatus::Enabled;
        RegisteredPlugin {
            info: slot.info.clone(),
            status: state.status.clone(),
            enabled,
            serves_http: slot.handlers.is_some(),
            routes: if enabled && slot.handlers.is_some() {
                self.binder.table().routes_for(&slot.info.id)
            } else {
                Vec::new()
            },
            last_error: state.last_error.clone(),
            registered_at: slot.registered_at,
        }
    }
}

/// Run a lifecycle hook, turning errors and panics into a message.
fn run_hook(hook: impl FnOnce() -> PluginResult<()>) -> std::result::Result<(), String> {
    match std::panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.message),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::interface::EchoPlugin;
    use crate::plugin::testing::{HookCounts, TestPlugin};
    use crate::routing::RouteTable;

    fn registry() -> PluginRegistry {
        PluginRegistry::new(RouteBinder::new(Arc::new(RouteTable::new())))
    }

    fn descriptor(plugin: TestPlugin) -> PluginDescriptor {
        PluginDescriptor::new(plugin.boxed())
    }

    #[test]
    fn test_registry_creation() {
        let registry = registry();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_plugin() {
        let registry = registry();
        assert!(registry.register(PluginDescriptor::new(Box::new(EchoPlugin::new()))));

        assert_eq!(registry.len(), 1);
        let plugin = registry.get("echo").unwrap();
        assert_eq!(plugin.status, PluginStatus::Registered);
        assert!(!plugin.enabled);
        assert!(plugin.serves_http);
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = registry();
        assert!(registry.register(descriptor(TestPlugin::new("p1"))));
        registry.enable("p1").unwrap();

        assert!(!registry.register(descriptor(TestPlugin::new("p1"))));
        assert_eq!(registry.list_all().len(), 1);
        assert!(registry.get("p1").unwrap().enabled);
    }

    #[test]
    fn test_get_unknown_is_none() {
        assert!(registry().get("missing").is_none());
    }

    #[test]
    fn test_enable_and_disable_without_http() {
        let registry = registry();
        let counts = HookCounts::default();
        registry.register(descriptor(TestPlugin::new("p1").with_counts(counts.clone())));

        registry.enable("p1").unwrap();
        let enabled = registry.list_enabled();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id(), "p1");
        assert_eq!(counts.initialized(), 1);

        registry.disable("p1").unwrap();
        assert!(registry.list_enabled().is_empty());
        assert_eq!(registry.get("p1").unwrap().status, PluginStatus::Disabled);
        assert_eq!(counts.shut_down(), 1);
    }

    #[test]
    fn test_enable_is_idempotent() {
        let registry = registry();
        let counts = HookCounts::default();
        registry.register(descriptor(
            TestPlugin::new("p1")
                .with_route(Route::get("/p1"))
                .with_counts(counts.clone()),
        ));

        registry.enable("p1").unwrap();
        registry.enable("p1").unwrap();

        assert_eq!(counts.initialized(), 1);
        assert_eq!(registry.binder().table().len(), 1);
    }

    #[test]
    fn test_disable_when_not_enabled_is_noop() {
        let registry = registry();
        let counts = HookCounts::default();
        registry.register(descriptor(TestPlugin::new("p1").with_counts(counts.clone())));

        registry.disable("p1").unwrap();
        assert_eq!(counts.shut_down(), 0);
        assert_eq!(registry.get("p1").unwrap().status, PluginStatus::Registered);
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let registry = registry();
        assert!(matches!(registry.enable("nope"), Err(Error::NotFound(_))));
        assert!(matches!(registry.disable("nope"), Err(Error::NotFound(_))));
        assert!(matches!(registry.remove("nope"), Err(Error::NotFound(_))));
        assert!(matches!(
            registry.configure("nope", ConfigMap::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_enable_disable_enable_rebinds_exact_handler_set() {
        let registry = registry();
        registry.register(descriptor(
            TestPlugin::new("p1")
                .with_route(Route::get("/p1/a"))
                .with_route(Route::post("/p1/b")),
        ));

        registry.enable("p1").unwrap();
        registry.disable("p1").unwrap();
        assert!(registry.binder().table().is_empty());
        registry.enable("p1").unwrap();

        let table = registry.binder().table();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.routes_for("p1"),
            vec![Route::get("/p1/a"), Route::post("/p1/b")]
        );
        assert_eq!(registry.get("p1").unwrap().routes.len(), 2);
    }

    #[test]
    fn test_failed_initialize_stays_disabled() {
        let registry = registry();
        registry.register(descriptor(
            TestPlugin::new("bad")
                .with_route(Route::get("/bad"))
                .failing_initialize(),
        ));

        let result = registry.enable("bad");
        assert!(matches!(result, Err(Error::ActivationFailure { .. })));

        let plugin = registry.get("bad").unwrap();
        assert!(!plugin.enabled);
        assert_eq!(plugin.status, PluginStatus::Registered);
        assert_eq!(plugin.last_error.as_deref(), Some("initialize refused"));
        assert!(registry.binder().table().is_empty());
    }

    #[test]
    fn test_panicking_initialize_is_contained() {
        let registry = registry();
        registry.register(descriptor(TestPlugin::new("boom").panicking_initialize()));

        match registry.enable("boom") {
            Err(Error::ActivationFailure { reason, .. }) => {
                assert!(reason.contains("initialize exploded"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!registry.get("boom").unwrap().enabled);
    }

    #[test]
    fn test_failed_shutdown_still_disables() {
        let registry = registry();
        registry.register(descriptor(
            TestPlugin::new("stuck")
                .with_route(Route::get("/stuck"))
                .failing_shutdown(),
        ));
        registry.enable("stuck").unwrap();

        assert!(registry.disable("stuck").is_ok());
        let plugin = registry.get("stuck").unwrap();
        assert!(!plugin.enabled);
        assert_eq!(plugin.last_error.as_deref(), Some("shutdown refused"));
        assert!(registry.binder().table().is_empty());
    }

    #[test]
    fn test_remove_enabled_plugin_shuts_down_first() {
        let registry = registry();
        let counts = HookCounts::default();
        registry.register(descriptor(
            TestPlugin::new("p1")
                .with_route(Route::get("/p1"))
                .with_counts(counts.clone()),
        ));
        registry.enable("p1").unwrap();

        registry.remove("p1").unwrap();
        assert_eq!(counts.shut_down(), 1);
        assert!(registry.get("p1").is_none());
        assert!(registry.binder().table().is_empty());

        assert!(registry.register(descriptor(TestPlugin::new("p1"))));
    }

    #[test]
    fn test_binding_conflict_does_not_fail_enable() {
        let registry = registry();
        registry.binder().table().reserve(Route::get("/taken"));
        registry.register(descriptor(
            TestPlugin::new("p2")
                .with_route(Route::get("/taken"))
                .with_route(Route::get("/free")),
        ));

        registry.enable("p2").unwrap();
        assert_eq!(
            registry.binder().table().routes_for("p2"),
            vec![Route::get("/free")]
        );
        let plugin = registry.get("p2").unwrap();
        assert!(plugin.enabled);
        assert_eq!(
            plugin.last_error.as_deref(),
            Some("Route GET /taken is already bound by host")
        );

        registry.disable("p2").unwrap();
        assert!(registry.get("p2").unwrap().last_error.is_none());
    }

    #[test]
    fn test_shutdown_all() {
        let registry = registry();
        registry.register(descriptor(TestPlugin::new("a")));
        registry.register(descriptor(TestPlugin::new("b")));
        registry.register(descriptor(TestPlugin::new("c")));
        registry.enable("a").unwrap();
        registry.enable("b").unwrap();

        assert_eq!(registry.shutdown_all(), 2);
        assert!(registry.list_enabled().is_empty());
    }

    #[test]
    fn test_enable_passes_config_to_plugin() {
        use crate::plugin::interface::PluginError;
        use std::sync::atomic::{AtomicBool, Ordering};

        struct NeedsConfig(Arc<AtomicBool>);

        impl Plugin for NeedsConfig {
            fn info(&self) -> PluginInfo {
                PluginInfo::new("cfg", "Configured", "0.1.0")
            }

            fn initialize(&mut self, ctx: &PluginContext) -> PluginResult<()> {
                match ctx.get_config::<String>("token") {
                    Some(_) => {
                        self.0.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                    None => Err(PluginError::new("token missing")),
                }
            }

            fn shutdown(&mut self) -> PluginResult<()> {
                Ok(())
            }
        }

        let seen = Arc::new(AtomicBool::new(false));
        let registry = registry();
        registry.register(PluginDescriptor::new(Box::new(NeedsConfig(seen.clone()))));

        assert!(registry.enable("cfg").is_err());

        let mut config = ConfigMap::new();
        config.insert("token".to_string(), serde_json::json!("secret"));
        registry.configure("cfg", config).unwrap();
        registry.enable("cfg").unwrap();
        assert!(seen.load(Ordering::SeqCst));
    }

    #[test]
    fn test_concurrent_enable_runs_initialize_once() {
        let registry = Arc::new(registry());
        let counts = HookCounts::default();
        registry.register(descriptor(TestPlugin::new("p1").with_counts(counts.clone())));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.enable("p1").unwrap())
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(counts.initialized(), 1);
        assert!(registry.get("p1").unwrap().enabled);
    }

    #[test]
    fn test_slow_initialize_does_not_block_other_plugins() {
        let registry = Arc::new(registry());
        let gate = Arc::new(std::sync::Barrier::new(2));
        registry.register(descriptor(TestPlugin::new("slow").gated_initialize(gate.clone())));
        registry.register(descriptor(TestPlugin::new("fast").with_route(Route::get("/fast"))));

        let enabling = {
            let registry = registry.clone();
            std::thread::spawn(move || registry.enable("slow"))
        };
        gate.wait();

        registry.enable("fast").unwrap();
        let all = registry.list_all();
        assert_eq!(all.len(), 2);
        assert!(registry.get("fast").unwrap().enabled);
        assert!(!registry.get("slow").unwrap().enabled);

        gate.wait();
        enabling.join().unwrap().unwrap();
        assert_eq!(registry.list_enabled().len(), 2);
    }

    #[test]
    fn test_health_report_covers_enabled_plugins() {
        let registry = registry();
        registry.register(descriptor(TestPlugin::new("ok")));
        registry.register(descriptor(TestPlugin::new("sick").unhealthy()));
        registry.register(descriptor(TestPlugin::new("idle").unhealthy()));
        registry.enable("sick").unwrap();
        registry.enable("ok").unwrap();

        let report = registry.health_report();
        let ids: Vec<&str> = report.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "sick"]);
        assert!(report[0].healthy);
        assert!(!report[1].healthy);
        assert!(report[1].error.is_none());
    }
}
