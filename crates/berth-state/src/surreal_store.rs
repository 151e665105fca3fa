use std::sync::Arc;

use async_trait::async_trait;

use crate::storage_traits::{
    validate_key, validate_scope, StateStore, StorageResult, StoreFactory, StoredEntry, WriteBatch,
};
use crate::SurrealHandle;

/// SurrealDB-backed implementation of the StateStore trait, scoped to one channel.
#[derive(Clone)]
pub struct SurrealStateStore {
    handle: Arc<SurrealHandle>,
    scope: String,
}

impl SurrealStateStore {
    pub fn new(handle: Arc<SurrealHandle>, scope: impl Into<String>) -> StorageResult<Self> {
        let scope = scope.into();
        validate_scope(&scope)?;
        Ok(Self { handle, scope })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

#[async_trait]
impl StateStore for SurrealStateStore {
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>> {
        validate_key(key)?;
        Ok(self
            .handle
            .state_get(&self.scope, key)
            .await?
            .map(|entry| entry.value))
    }

    async fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> StorageResult<Vec<StoredEntry>> {
        let entries = self.handle.state_list(&self.scope, prefix).await?;
        let page = entries.into_iter().skip(offset);
        Ok(match limit {
            Some(n) => page.take(n).collect(),
            None => page.collect(),
        })
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        batch.validate()?;
        self.handle.state_commit(&self.scope, batch).await
    }
}

/// Opens `SurrealStateStore`s sharing one connection.
#[derive(Clone)]
pub struct SurrealStoreFactory {
    handle: Arc<SurrealHandle>,
}

impl SurrealStoreFactory {
    pub fn new(handle: Arc<SurrealHandle>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl StoreFactory for SurrealStoreFactory {
    async fn open(&self, scope: &str) -> StorageResult<Arc<dyn StateStore>> {
        let store: Arc<dyn StateStore> =
            Arc::new(SurrealStateStore::new(self.handle.clone(), scope)?);
        Ok(store)
    }
}
