//! Plugin discovery.
//!
//! Discoverers enumerate plugin implementations; `PluginDiscovery` feeds them
//! into the registry. One broken candidate never stops the rest.

use crate::core::{Error, Result};
use crate::plugin::interface::{Plugin, PluginDescriptor};
use crate::plugin::registry::{panic_message, PluginRegistry};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Source of plugin implementations.
pub trait Discoverer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Load every candidate. Each candidate succeeds or fails on its own.
    fn load(&self) -> Vec<Result<PluginDescriptor>>;
}

type PluginFactory = Box<dyn Fn() -> Result<Box<dyn Plugin>> + Send + Sync>;

/// Discoverer over a fixed list of plugin factories.
///
/// This is the compiled-in counterpart of a service-provider lookup: each
/// factory is one provider entry.
pub struct FactoryDiscoverer {
    name: String,
    factories: Vec<PluginFactory>,
}

impl FactoryDiscoverer {
    /// Create an empty discoverer.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            factories: Vec::new(),
        }
    }

    /// Add a fallible factory.
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        self.factories.push(Box::new(factory));
        self
    }

    /// Add a factory for a plugin type with a `Default` impl.
    pub fn with_default<P>(self) -> Self
    where
        P: Plugin + Default + 'static,
    {
        self.with_factory(|| Ok(Box::new(P::default()) as Box<dyn Plugin>))
    }

    /// Number of factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether there are no factories.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Discoverer for FactoryDiscoverer {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Vec<Result<PluginDescriptor>> {
        self.factories
            .iter()
            .enumerate()
            .map(|(index, factory)| {
                match std::panic::catch_unwind(AssertUnwindSafe(|| {
                    factory().map(PluginDescriptor::new)
                })) {
                    Ok(result) => result,
                    Err(panic) => Err(Error::DiscoveryFailed(format!(
                        "factory #{} {}",
                        index,
                        panic_message(panic.as_ref())
                    ))),
                }
            })
            .collect()
    }
}

/// Runs discoverers and registers what they find.
pub struct PluginDiscovery {
    registry: Arc<PluginRegistry>,
    discoverers: Vec<Arc<dyn Discoverer>>,
}

impl PluginDiscovery {
    /// Create discovery over a registry.
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            registry,
            discoverers: Vec::new(),
        }
    }

    /// Add a discoverer.
    pub fn with_discoverer(mut self, discoverer: Arc<dyn Discoverer>) -> Self {
        self.discoverers.push(discoverer);
        self
    }

    /// Run a discovery pass. Returns the number of newly registered plugins.
    ///
    /// Safe to call repeatedly; ids already registered are skipped.
    pub fn discover(&self) -> usize {
        let mut registered = 0;
        for discoverer in &self.discoverers {
            let candidates = std::panic::catch_unwind(AssertUnwindSafe(|| discoverer.load()))
                .unwrap_or_else(|panic| {
                    vec![Err(Error::DiscoveryFailed(panic_message(panic.as_ref())))]
                });

            for candidate in candidates {
                match candidate {
                    Ok(descriptor) => {
                        if self.registry.contains(descriptor.id()) {
                            debug!(plugin_id = descriptor.id(), "Plugin already known");
                            continue;
                        }
                        if self.registry.register(descriptor) {
                            registered += 1;
                        }
                    }
                    Err(e) => {
                        error!(discoverer = discoverer.name(), error = %e, "Skipping plugin candidate");
                    }
                }
            }
        }
        info!(registered, total = self.registry.len(), "Plugin discovery finished");
        registered
    }
}
