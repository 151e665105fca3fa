//! Storage trait definitions for Berth
//!
//! These traits define the persistence seam used by release actors:
//! - `StateStore`: durable per-key storage scoped to one actor instance
//! - `StoreFactory`: opens an isolated `StateStore` per channel
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Check that a key is usable by every backend.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.chars().any(|c| c.is_control()) {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Check that a scope (channel identifier) is usable as a namespace.
pub fn validate_scope(scope: &str) -> StorageResult<()> {
    let ok = !scope.is_empty()
        && scope.len() <= 64
        && scope
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !ok {
        return Err(StorageError::InvalidScope {
            scope: scope.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// WriteBatch
// ---------------------------------------------------------------------------

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Insert or overwrite.
    Put {
        key: String,
        value: serde_json::Value,
    },
    /// Insert only; the whole batch fails with `KeyExists` if the key is taken.
    Create {
        key: String,
        value: serde_json::Value,
    },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Create { key, .. } => key,
        }
    }

    pub fn value(&self) -> &serde_json::Value {
        match self {
            WriteOp::Put { value, .. } | WriteOp::Create { value, .. } => value,
        }
    }
}

/// An ordered group of writes applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an insert-or-overwrite of `value` under `key`.
    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> StorageResult<()> {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value: serde_json::to_value(value)?,
        });
        Ok(())
    }

    /// Queue a create-only write of `value` under `key`.
    pub fn create<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> StorageResult<()> {
        self.ops.push(WriteOp::Create {
            key: key.into(),
            value: serde_json::to_value(value)?,
        });
        Ok(())
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Validate every key in the batch.
    pub fn validate(&self) -> StorageResult<()> {
        self.ops.iter().try_for_each(|op| validate_key(op.key()))
    }
}

// ---------------------------------------------------------------------------
// StateStore: Durable Per-Key Storage
// ---------------------------------------------------------------------------

/// A stored key together with its value, as returned by [`StateStore::list`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub key: String,
    pub value: serde_json::Value,
}

/// Durable key/value storage owned by a single actor instance.
///
/// Guarantees:
/// - `get(key)` returns the last value committed under `key`.
/// - `list(prefix, ..)` returns entries ordered by key (byte order).
/// - `commit(batch)` applies every write or none of them; a `Create`
///   targeting an existing key fails the whole batch with `KeyExists`.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Option<serde_json::Value>>;

    /// Insert or overwrite a single key.
    async fn put(&self, key: &str, value: serde_json::Value) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.ops.push(WriteOp::Put {
            key: key.to_string(),
            value,
        });
        self.commit(batch).await
    }

    /// List entries whose key starts with `prefix`, ordered by key.
    ///
    /// `offset` entries are skipped before at most `limit` are returned;
    /// `limit = None` means unbounded.
    async fn list(
        &self,
        prefix: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> StorageResult<Vec<StoredEntry>>;

    /// Apply a batch of writes atomically.
    async fn commit(&self, batch: WriteBatch) -> StorageResult<()>;
}

/// Opens one isolated [`StateStore`] per scope (channel).
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn open(&self, scope: &str) -> StorageResult<Arc<dyn StateStore>>;
}
