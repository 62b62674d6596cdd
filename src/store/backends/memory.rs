//! In-memory store.
//!
//! Process-local map; used for tests and for hosts that do not need state
//! to survive a restart.

use crate::core::{Error, Result};
use crate::store::backend::{BackendType, PluginStore};
use crate::store::record::PluginRecord;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory plugin store.
pub struct MemoryStore {
    /// Records by id
    records: RwLock<HashMap<String, PluginRecord>>,
    /// Availability flag
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Mark the store reachable or unreachable.
    ///
    /// While unreachable every operation fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable("memory store is offline".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginStore for MemoryStore {
    async fn save(&self, record: PluginRecord) -> Result<PluginRecord> {
        self.check()?;
        self.records.write().insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find(&self, id: &str) -> Result<Option<PluginRecord>> {
        self.check()?;
        Ok(self.records.read().get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<PluginRecord>> {
        self.check()?;
        let mut records: Vec<PluginRecord> = self.records.read().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.available.load(Ordering::SeqCst))
    }

    async fn count(&self) -> Result<u64> {
        self.check()?;
        Ok(self.records.read().len() as u64)
    }
}
