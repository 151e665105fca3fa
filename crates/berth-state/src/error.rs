//! Error types for berth-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the SurrealDB backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors surfaced through the [`StateStore`](crate::StateStore) trait.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A create-only write targeted a key that already holds a value.
    #[error("key already exists: {key}")]
    KeyExists { key: String },

    /// Keys must be non-empty and free of control characters.
    #[error("invalid key: {key:?}")]
    InvalidKey { key: String },

    /// Scopes isolate one actor's keys from another's.
    #[error("invalid scope: {scope:?}")]
    InvalidScope { scope: String },

    /// A stored payload could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
