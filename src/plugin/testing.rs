//! Plugin fixtures shared by unit tests.

use crate::plugin::interface::{
    FnHandler, Plugin, PluginContext, PluginError, PluginInfo, PluginResult, RequestHandler,
};
use crate::routing::Route;
use axum::response::IntoResponse;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

/// Hook call counters, shared with the test body.
#[derive(Clone, Default)]
pub struct HookCounts {
    pub initialized: Arc<AtomicUsize>,
    pub shut_down: Arc<AtomicUsize>,
}

impl HookCounts {
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn shut_down(&self) -> usize {
        self.shut_down.load(Ordering::SeqCst)
    }
}

/// Configurable plugin for exercising the registry.
pub struct TestPlugin {
    info: PluginInfo,
    routes: Vec<Route>,
    fail_initialize: bool,
    fail_shutdown: bool,
    panic_on_initialize: bool,
    unhealthy: bool,
    gate: Option<Arc<Barrier>>,
    counts: HookCounts,
}

impl TestPlugin {
    pub fn new(id: &str) -> Self {
        Self {
            info: PluginInfo::new(id, &format!("Plugin {}", id), "1.0.0"),
            routes: Vec::new(),
            fail_initialize: false,
            fail_shutdown: false,
            panic_on_initialize: false,
            unhealthy: false,
            gate: None,
            counts: HookCounts::default(),
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub fn panicking_initialize(mut self) -> Self {
        self.panic_on_initialize = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.unhealthy = true;
        self
    }

    /// `initialize` meets the test at `gate` twice: once on entry, once
    /// before returning.
    pub fn gated_initialize(mut self, gate: Arc<Barrier>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_counts(mut self, counts: HookCounts) -> Self {
        self.counts = counts;
        self
    }

    pub fn boxed(self) -> Box<dyn Plugin> {
        Box::new(self)
    }
}

impl Plugin for TestPlugin {
    fn info(&self) -> PluginInfo {
        self.info.clone()
    }

    fn initialize(&mut self, _ctx: &PluginContext) -> PluginResult<()> {
        if let Some(gate) = &self.gate {
            gate.wait();
            gate.wait();
        }
        if self.panic_on_initialize {
            panic!("initialize exploded");
        }
        if self.fail_initialize {
            return Err(PluginError::new("initialize refused"));
        }
        self.counts.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&mut self) -> PluginResult<()> {
        self.counts.shut_down.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown {
            return Err(PluginError::new("shutdown refused"));
        }
        Ok(())
    }

    fn health_check(&self) -> PluginResult<bool> {
        Ok(!self.unhealthy)
    }

    fn request_handlers(&self) -> Option<Vec<Arc<dyn RequestHandler>>> {
        if self.routes.is_empty() {
            return None;
        }
        let id = self.info.id.clone();
        Some(
            self.routes
                .iter()
                .map(|route| {
                    let id = id.clone();
                    Arc::new(FnHandler::new(route.clone(), move |_req| {
                        let id = id.clone();
                        async move { id.into_response() }
                    })) as Arc<dyn RequestHandler>
                })
                .collect(),
        )
    }
}
