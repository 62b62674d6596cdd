//! Plugin manager.
//!
//! Operator-facing orchestration over the registry, discovery and the
//! metadata store. Registry state is authoritative: a store failure after a
//! successful transition is reported but never rolled back.
//!
//! Mutating calls hold a per-id lock from the registry transition until the
//! record is written, so records land in the order transitions happened.

use crate::core::{ConfigMap, Error, Result};
use crate::plugin::{PluginDiscovery, PluginRegistry, RegisteredPlugin};
use crate::store::{PluginMetadataService, PluginRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

type IdLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// Plugin management façade.
#[derive(Clone)]
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
    discovery: Arc<PluginDiscovery>,
    metadata: PluginMetadataService,
    /// Transition-and-persist locks, one per plugin id
    locks: Arc<IdLocks>,
}

impl PluginManager {
    /// Create a new manager.
    pub fn new(
        registry: Arc<PluginRegistry>,
        discovery: Arc<PluginDiscovery>,
        metadata: PluginMetadataService,
    ) -> Self {
        Self {
            registry,
            discovery,
            metadata,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Live registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Metadata service.
    pub fn metadata(&self) -> &PluginMetadataService {
        &self.metadata
    }

    /// All persisted records.
    pub async fn list_plugins(&self) -> Result<Vec<PluginRecord>> {
        self.metadata.list().await
    }

    /// One plugin's record.
    ///
    /// Falls back to a record built from the live registry for plugins that
    /// have not been persisted yet.
    pub async fn get_plugin(&self, id: &str) -> Result<PluginRecord> {
        if let Some(record) = self.metadata.get(id).await? {
            return Ok(record);
        }
        self.registry
            .get(id)
            .map(|live| PluginRecord::from_registered(&live))
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Enable a plugin and persist the transition.
    pub async fn enable_plugin(&self, id: &str) -> Result<PluginRecord> {
        let _guard = self.lock_id(id).await;
        if !self.registry.contains(id) {
            return Err(Error::NotFound(id.to_string()));
        }
        self.load_config(id).await;

        let registry = self.registry.clone();
        let plugin_id = id.to_string();
        tokio::task::spawn_blocking(move || registry.enable(&plugin_id)).await??;

        let live = self.live(id)?;
        self.metadata.upsert_from_descriptor(&live).await
    }

    /// Disable a plugin and persist the transition.
    pub async fn disable_plugin(&self, id: &str) -> Result<PluginRecord> {
        let _guard = self.lock_id(id).await;
        let registry = self.registry.clone();
        let plugin_id = id.to_string();
        tokio::task::spawn_blocking(move || registry.disable(&plugin_id)).await??;

        let live = self.live(id)?;
        self.metadata.upsert_from_descriptor(&live).await
    }

    /// Run a discovery pass. Returns the number of newly registered plugins.
    pub async fn discover_plugins(&self) -> Result<usize> {
        let discovery = self.discovery.clone();
        Ok(tokio::task::spawn_blocking(move || discovery.discover()).await?)
    }

    /// Reconcile the store with the registry.
    ///
    /// Holds every registered id's lock, so no transition lands between the
    /// snapshot and the writes.
    pub async fn synchronize_plugins(&self) -> Result<Vec<PluginRecord>> {
        let mut ids: Vec<String> = self.registry.list_all().into_iter().map(|p| p.info.id).collect();
        ids.sort();
        let mut guards = Vec::with_capacity(ids.len());
        for id in &ids {
            guards.push(self.lock_id(id).await);
        }
        self.metadata.synchronize(&self.registry.list_all()).await
    }

    /// Re-run discovery, then reconcile the store with the registry.
    pub async fn refresh_plugins(&self) -> Result<Vec<PluginRecord>> {
        let added = self.discover_plugins().await?;
        info!(added, "Refreshing plugin records");
        self.synchronize_plugins().await
    }

    /// Replace a plugin's configuration.
    ///
    /// The new map is handed to the plugin on its next `initialize`.
    pub async fn update_plugin_config(&self, id: &str, config: ConfigMap) -> Result<PluginRecord> {
        let _guard = self.lock_id(id).await;
        if let Some(live) = self.registry.get(id) {
            if !self.metadata.is_installed(id).await? {
                self.metadata.upsert_from_descriptor(&live).await?;
            }
            self.registry.configure(id, config.clone())?;
        }
        self.metadata.update_config(id, config).await
    }

    /// Remove a plugin from the registry, disabling it first if needed.
    ///
    /// The stored record is kept, marked disabled.
    pub async fn remove_plugin(&self, id: &str) -> Result<Option<PluginRecord>> {
        let _guard = self.lock_id(id).await;
        let registry = self.registry.clone();
        let plugin_id = id.to_string();
        tokio::task::spawn_blocking(move || registry.remove(&plugin_id)).await??;

        self.metadata.mark_disabled(id).await
    }

    /// Re-enable every registered plugin whose record says enabled.
    ///
    /// Failures are logged per plugin. Returns how many were enabled.
    pub async fn restore_enabled(&self) -> Result<usize> {
        let mut restored = 0;
        for record in self.metadata.list_enabled().await? {
            if !self.registry.contains(&record.id) {
                warn!(plugin_id = %record.id, "Enabled plugin is not registered, skipping restore");
                continue;
            }
            match self.enable_plugin(&record.id).await {
                Ok(_) => restored += 1,
                Err(e) => warn!(plugin_id = %record.id, error = %e, "Failed to restore plugin"),
            }
        }
        info!(restored, "Restored enabled plugins");
        Ok(restored)
    }

    async fn lock_id(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().entry(id.to_string()).or_default().clone();
        lock.lock_owned().await
    }

    async fn load_config(&self, id: &str) {
        match self.metadata.get(id).await {
            Ok(Some(record)) => {
                if let Err(e) = self.registry.configure(id, record.config) {
                    warn!(plugin_id = id, error = %e, "Failed to apply stored config");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(plugin_id = id, error = %e, "Stored config unavailable, enabling with current config"),
        }
    }

    fn live(&self, id: &str) -> Result<RegisteredPlugin> {
        self.registry
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::testing::{HookCounts, TestPlugin};
    use crate::plugin::{FactoryDiscoverer, PluginDescriptor};
    use crate::routing::{Route, RouteBinder, RouteTable};
    use crate::store::{BackendType, MemoryStore, PluginStore};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Fixture {
        manager: PluginManager,
        store: Arc<MemoryStore>,
        table: Arc<RouteTable>,
    }

    fn fixture(discoverer: FactoryDiscoverer) -> Fixture {
        let table = Arc::new(RouteTable::new());
        let registry = Arc::new(PluginRegistry::new(RouteBinder::new(table.clone())));
        let discovery =
            Arc::new(PluginDiscovery::new(registry.clone()).with_discoverer(Arc::new(discoverer)));
        let store = Arc::new(MemoryStore::new());
        let manager = PluginManager::new(
            registry,
            discovery,
            PluginMetadataService::new(store.clone()),
        );
        Fixture {
            manager,
            store,
            table,
        }
    }

    /// Store whose writes of enabled records are slow.
    struct SlowEnableStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl PluginStore for SlowEnableStore {
        async fn save(&self, record: PluginRecord) -> Result<PluginRecord> {
            if record.enabled {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            self.inner.save(record).await
        }

        async fn find(&self, id: &str) -> Result<Option<PluginRecord>> {
            self.inner.find(id).await
        }

        async fn find_all(&self) -> Result<Vec<PluginRecord>> {
            self.inner.find_all().await
        }

        fn backend_type(&self) -> BackendType {
            BackendType::Memory
        }
    }

    fn register(manager: &PluginManager, plugin: TestPlugin) {
        assert!(manager
            .registry()
            .register(PluginDescriptor::new(plugin.boxed())));
    }

    #[tokio::test]
    async fn test_refresh_with_nothing_then_enable_unknown() {
        let fx = fixture(FactoryDiscoverer::new("empty"));

        let records = fx.manager.refresh_plugins().await.unwrap();
        assert!(records.is_empty());

        let result = fx.manager.enable_plugin("nonexistent").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(matches!(
            fx.manager.get_plugin("nonexistent").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_enable_and_disable_plain_plugin() {
        let fx = fixture(FactoryDiscoverer::new("empty"));
        register(&fx.manager, TestPlugin::new("p1"));

        let record = fx.manager.enable_plugin("p1").await.unwrap();
        assert!(record.enabled);
        let enabled = fx.manager.registry().list_enabled();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id(), "p1");

        let record = fx.manager.disable_plugin("p1").await.unwrap();
        assert!(!record.enabled);
        assert!(record.last_disabled_at.is_some());
        assert!(fx.manager.registry().list_enabled().is_empty());
    }

    #[tokio::test]
    async fn test_enable_with_colliding_route_still_succeeds() {
        let fx = fixture(FactoryDiscoverer::new("empty"));
        fx.table.reserve(Route::get("/shared"));
        register(
            &fx.manager,
            TestPlugin::new("p2")
                .with_route(Route::get("/shared"))
                .with_route(Route::get("/p2/own")),
        );

        let record = fx.manager.enable_plugin("p2").await.unwrap();
        assert!(record.enabled);
        assert_eq!(fx.table.routes_for("p2"), vec![Route::get("/p2/own")]);
    }

    #[tokio::test]
    async fn test_repeated_enable_keeps_timestamp() {
        let fx = fixture(FactoryDiscoverer::new("empty"));
        let counts = HookCounts::default();
        register(&fx.manager, TestPlugin::new("p1").with_counts(counts.clone()));

        let first = fx.manager.enable_plugin("p1").await.unwrap();
        let second = fx.manager.enable_plugin("p1").await.unwrap();

        assert_eq!(first.last_enabled_at, second.last_enabled_at);
        assert_eq!(counts.initialized(), 1);
    }

    #[tokio::test]
    async fn test_failed_enable_reports_activation_failure() {
        let fx = fixture(FactoryDiscoverer::new("empty"));
        register(
            &fx.manager,
            TestPlugin::new("bad")
                .with_route(Route::get("/bad"))
                .failing_initialize(),
        );

        let result = fx.manager.enable_plugin("bad").await;
        assert!(matches!(result, Err(Error::ActivationFailure { .. })));
        assert!(fx.table.is_empty());
        assert!(!fx.manager.metadata().is_enabled("bad").await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_disables_vanished_plugin() {
        let fx = fixture(FactoryDiscoverer::new("builtin").with_factory(|| Ok(TestPlugin::new("live").boxed())));
        register(&fx.manager, TestPlugin::new("ghost"));
        fx.manager.enable_plugin("ghost").await.unwrap();
        fx.manager.remove_plugin("ghost").await.unwrap();

        // Re-enable the stored record to model a stale row from a previous run.
        let mut stale = fx.manager.get_plugin("ghost").await.unwrap();
        stale.set_enabled(true);
        fx.manager.metadata().store().save(stale).await.unwrap();

        let records = fx.manager.refresh_plugins().await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["live", "ghost"]);

        let ghost = fx.manager.get_plugin("ghost").await.unwrap();
        assert!(!ghost.enabled);
        assert!(ghost.last_disabled_at.is_some());
    }

    #[tokio::test]
    async fn test_store_outage_does_not_roll_back_registry() {
        let fx = fixture(FactoryDiscoverer::new("empty"));
        register(&fx.manager, TestPlugin::new("p1"));
        fx.store.set_available(false);

        let result = fx.manager.enable_plugin("p1").await;
        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
        assert!(fx.manager.registry().get("p1").unwrap().enabled);
    }

    #[tokio::test]
    async fn test_update_config_reaches_plugin_record() {
        let fx = fixture(FactoryDiscoverer::new("empty"));
        register(&fx.manager, TestPlugin::new("p1"));

        let mut config = ConfigMap::new();
        config.insert("greeting".to_string(), serde_json::json!("hi"));
        let record = fx.manager.update_plugin_config("p1", config.clone()).await.unwrap();
        assert_eq!(record.config, config);

        let record = fx.manager.enable_plugin("p1").await.unwrap();
        assert_eq!(record.config, config);

        assert!(matches!(
            fx.manager.update_plugin_config("missing", ConfigMap::new()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_enabled() {
        let fx = fixture(FactoryDiscoverer::new("empty"));
        register(&fx.manager, TestPlugin::new("a"));
        register(&fx.manager, TestPlugin::new("b"));
        fx.manager.enable_plugin("a").await.unwrap();
        fx.manager.refresh_plugins().await.unwrap();

        fx.manager.registry().shutdown_all();
        assert!(fx.manager.registry().list_enabled().is_empty());

        assert_eq!(fx.manager.restore_enabled().await.unwrap(), 1);
        let enabled = fx.manager.registry().list_enabled();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id(), "a");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_enable_and_disable_persist_in_order() {
        let registry = Arc::new(PluginRegistry::new(RouteBinder::new(Arc::new(RouteTable::new()))));
        let discovery = Arc::new(PluginDiscovery::new(registry.clone()));
        let store = Arc::new(SlowEnableStore {
            inner: MemoryStore::new(),
        });
        let manager = PluginManager::new(
            registry,
            discovery,
            PluginMetadataService::new(store.clone()),
        );
        register(&manager, TestPlugin::new("p1"));

        let enabling = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.enable_plugin("p1").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let disabled = manager.disable_plugin("p1").await.unwrap();
        enabling.await.unwrap().unwrap();

        assert!(!disabled.enabled);
        assert!(!manager.registry().get("p1").unwrap().enabled);

        let stored = store.find("p1").await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert!(stored.last_enabled_at.is_some());
        assert!(stored.last_disabled_at.is_some());
    }
}
