//! Process-local state store

use crate::error::BuildCacheResult;
use crate::state::StateStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// State store held in memory, for embedding both phases in one process
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put(&self, name: &str, value: &str) -> BuildCacheResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, name: &str) -> BuildCacheResult<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(name).cloned())
    }
}
