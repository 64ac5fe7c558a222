//! In-memory storage and helpers for orchestration tests

use crate::config::schema::CacheConfig;
use crate::config::ActionInputs;
use crate::error::{BuildCacheError, BuildCacheResult};
use crate::event::EventContext;
use crate::orchestration::{CacheOrchestrator, OutputSink};
use crate::state::{MemoryStateStore, StateStore};
use crate::storage::{
    newest, ArtifactEntry, ArtifactId, SaveReceipt, StorageClient, StorageConfig,
    StorageConnector,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Storage backend held in memory, recording every call
#[derive(Default)]
pub(crate) struct MemoryStorage {
    entries: Mutex<Vec<ArtifactEntry>>,
    prefix_lookups: Mutex<Vec<String>>,
    restored: Mutex<Vec<String>>,
    persisted: Mutex<Vec<String>>,
    lookup_calls: Mutex<usize>,
    fail_lookups: bool,
    fail_restore: bool,
    fail_persist: bool,
    panic_on_persist: bool,
    ignore_prefixes: bool,
    lookup_delay: Option<Duration>,
}

impl MemoryStorage {
    /// Store with the given keys; later keys are newer
    pub(crate) fn with_keys(keys: &[&str]) -> Self {
        let storage = Self::default();
        for key in keys {
            storage.insert(key);
        }
        storage
    }

    fn insert(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap();
        let created_at = Utc
            .timestamp_opt(1_700_000_000 + entries.len() as i64, 0)
            .unwrap();
        entries.push(ArtifactEntry {
            key: key.to_string(),
            created_at,
            size_bytes: Some(1),
        });
    }

    pub(crate) fn failing_lookups(mut self) -> Self {
        self.fail_lookups = true;
        self
    }

    pub(crate) fn failing_restore(mut self) -> Self {
        self.fail_restore = true;
        self
    }

    pub(crate) fn failing_persist(mut self) -> Self {
        self.fail_persist = true;
        self
    }

    pub(crate) fn panicking_persist(mut self) -> Self {
        self.panic_on_persist = true;
        self
    }

    /// Prefix lookups return the newest entry regardless of prefix
    pub(crate) fn ignoring_prefixes(mut self) -> Self {
        self.ignore_prefixes = true;
        self
    }

    pub(crate) fn slow_lookups(mut self, delay: Duration) -> Self {
        self.lookup_delay = Some(delay);
        self
    }

    pub(crate) fn prefix_lookups(&self) -> Vec<String> {
        self.prefix_lookups.lock().unwrap().clone()
    }

    pub(crate) fn restored(&self) -> Vec<String> {
        self.restored.lock().unwrap().clone()
    }

    pub(crate) fn persisted(&self) -> Vec<String> {
        self.persisted.lock().unwrap().clone()
    }

    /// Number of lookups of either kind
    pub(crate) fn lookup_calls(&self) -> usize {
        *self.lookup_calls.lock().unwrap()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.key.clone())
            .collect()
    }

    async fn before_lookup(&self) -> BuildCacheResult<()> {
        *self.lookup_calls.lock().unwrap() += 1;
        if let Some(delay) = self.lookup_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_lookups {
            return Err(BuildCacheError::Lookup("backend unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn find_exact(&self, key: &str) -> BuildCacheResult<Option<ArtifactEntry>> {
        self.before_lookup().await?;
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().find(|e| e.key == key).cloned())
    }

    async fn find_latest_by_prefix(
        &self,
        prefix: &str,
    ) -> BuildCacheResult<Option<ArtifactEntry>> {
        self.before_lookup().await?;
        self.prefix_lookups.lock().unwrap().push(prefix.to_string());
        let entries = self.entries.lock().unwrap();
        let ignore = self.ignore_prefixes;
        Ok(newest(
            entries
                .iter()
                .filter(|e| ignore || e.key.starts_with(prefix))
                .cloned(),
        ))
    }

    async fn restore(&self, entry: &ArtifactEntry, _paths: &[String]) -> BuildCacheResult<()> {
        if self.fail_restore {
            return Err(BuildCacheError::Transfer("connection reset".to_string()));
        }
        self.restored.lock().unwrap().push(entry.key.clone());
        Ok(())
    }

    async fn persist(&self, _paths: &[String], key: &str) -> BuildCacheResult<SaveReceipt> {
        if self.panic_on_persist {
            panic!("upload stream closed");
        }
        if self.fail_persist {
            return Err(BuildCacheError::Transfer("bucket is read-only".to_string()));
        }
        self.persisted.lock().unwrap().push(key.to_string());
        if self.entries.lock().unwrap().iter().any(|e| e.key == key) {
            return Ok(SaveReceipt::Declined);
        }
        self.insert(key);
        Ok(SaveReceipt::Stored(ArtifactId(format!("mem-{}", key))))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Connector that always hands out the same storage
pub(crate) struct SharedConnector(pub(crate) Arc<MemoryStorage>);

impl StorageConnector for SharedConnector {
    fn connect(&self, _config: &StorageConfig) -> BuildCacheResult<Arc<dyn StorageClient>> {
        Ok(self.0.clone())
    }
}

/// Orchestrator wired to in-memory storage and state
pub(crate) struct Harness {
    pub(crate) storage: Arc<MemoryStorage>,
    pub(crate) state: Arc<MemoryStateStore>,
    pub(crate) orchestrator: CacheOrchestrator,
}

pub(crate) fn push_event() -> EventContext {
    EventContext::new("push", Some("refs/heads/main".to_string()))
}

pub(crate) fn harness(storage: MemoryStorage, event: EventContext) -> Harness {
    harness_with(storage, event, CacheConfig::default())
}

pub(crate) fn harness_with(
    storage: MemoryStorage,
    event: EventContext,
    cache: CacheConfig,
) -> Harness {
    let storage = Arc::new(storage);
    let state = Arc::new(MemoryStateStore::new());
    let orchestrator = CacheOrchestrator::new(
        Box::new(SharedConnector(storage.clone())),
        state.clone() as Arc<dyn StateStore>,
        OutputSink::capture(),
        event,
        cache,
    );
    Harness {
        storage,
        state,
        orchestrator,
    }
}

/// Inputs with one cached path
pub(crate) fn inputs(key: &str, restore_keys: &[&str]) -> ActionInputs {
    ActionInputs {
        key: Some(key.to_string()),
        restore_keys: Some(restore_keys.join("\n")),
        path: Some("target".to_string()),
        ..Default::default()
    }
}
