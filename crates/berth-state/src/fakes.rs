//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryStateStore` and `MemoryStoreFactory` that satisfy the
//! trait contracts without any external dependencies.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryStateStore
// ---------------------------------------------------------------------------

/// In-memory state store backed by a `BTreeMap<key, value>`.
///
/// `fail_commits(true)` makes every subsequent commit fail with a backend
/// error, leaving the map untouched.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<BTreeMap<String, serde_json::Value>>,
    failing: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle commit failure injection.
    pub fn fail_commits(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        validate_key(key)?;
        let entries = self.entries.lock().unwrap();
        Ok(entries.get(key).cloned())
    }

    async fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> StorageResult<Vec<StoredEntry>> {
        let entries = self.entries.lock().unwrap();
        let matching = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .skip(offset)
            .map(|(k, v)| StoredEntry {
                key: k.clone(),
                value: v.clone(),
            });
        Ok(match limit {
            Some(n) => matching.take(n).collect(),
            None => matching.collect(),
        })
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        batch.validate()?;
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected commit failure".to_string()));
        }

        let mut entries = self.entries.lock().unwrap();
        // Check every create before touching the map so the batch stays atomic.
        for op in batch.ops() {
            if let WriteOp::Create { key, .. } = op {
                if entries.contains_key(key) {
                    return Err(StorageError::KeyExists { key: key.clone() });
                }
            }
        }
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } | WriteOp::Create { key, value } => {
                    entries.insert(key, value);
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryStoreFactory
// ---------------------------------------------------------------------------

/// Hands out one `MemoryStateStore` per scope.
///
/// Reopening a scope returns the same store, so a restarted actor sees the
/// state its predecessor left behind.
#[derive(Debug, Default)]
pub struct MemoryStoreFactory {
    stores: Mutex<HashMap<String, Arc<MemoryStateStore>>>,
}

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access to a scope's store (creating it if needed).
    pub fn store(&self, scope: &str) -> Arc<MemoryStateStore> {
        let mut stores = self.stores.lock().unwrap();
        stores
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(MemoryStateStore::new()))
            .clone()
    }
}

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn open(&self, scope: &str) -> StorageResult<Arc<dyn StateStore>> {
        validate_scope(scope)?;
        let store: Arc<dyn StateStore> = self.store(scope);
        Ok(store)
    }
}
