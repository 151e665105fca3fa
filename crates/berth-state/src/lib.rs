//! Berth-State: SurrealDB Backend for Berth
//!
//! This crate provides the persistence layer for release coordination
//! actors. Every actor owns one scope of durable key/value state and
//! writes to it in atomic batches.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Data integrity, atomic multi-key writes, per-channel isolation.
//!
//! ## Key Components
//!
//! - `StateStore`: Scoped key/value storage with atomic `WriteBatch` commits
//! - `SurrealHandle`: Manages the SurrealDB connection and transactions
//! - `MemoryStateStore`: In-memory fake for tests

mod error;
pub mod fakes;
mod handle;
pub mod storage_traits;
mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, SurrealHandle};
pub use storage_traits::{
    validate_key, validate_scope, StateStore, StorageResult, StoreFactory, StoredEntry,
    WriteBatch, WriteOp,
};
pub use surreal_store::{SurrealStateStore, SurrealStoreFactory};

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
