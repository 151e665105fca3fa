//! SurrealDB Handle - Connection and Operations
//!
//! Manages the connection and provides the scoped key/value operations
//! backing [`SurrealStateStore`](crate::SurrealStateStore).
//!
//! Supports in-memory (`mem://`), on-disk (`surrealkv://`) and remote
//! (WebSocket) connections.

use std::path::Path;

use crate::error::StateError;
use crate::storage_traits::{StorageResult, StoredEntry, WriteBatch, WriteOp};
use crate::Result;
use crate::StorageError;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

const DEFAULT_NAMESPACE: &str = "berth";
const DEFAULT_DATABASE: &str = "releases";

/// Configuration for a remote SurrealDB connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "berth")
    pub namespace: String,
    /// Database name (default: "releases")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "berth")
    /// - SURREALDB_DATABASE (optional, default: "releases")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> std::result::Result<Self, String> {
        let required = |name: &str| var(name).ok_or_else(|| format!("{name} not set"));
        Ok(Self {
            endpoint: required("SURREALDB_ENDPOINT")?,
            username: required("SURREALDB_USERNAME")?,
            password: required("SURREALDB_PASSWORD")?,
            namespace: var("SURREALDB_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            database: var("SURREALDB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            is_root: var("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }
}

/// SurrealDB connection handle
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

/// Row shape of the `state` table. Payloads are stored as JSON text so
/// arbitrary documents survive the round trip unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbStateEntry {
    key: String,
    payload: String,
}

impl DbStateEntry {
    fn into_stored_entry(self) -> StorageResult<StoredEntry> {
        Ok(StoredEntry {
            value: serde_json::from_str(&self.payload)?,
            key: self.key,
        })
    }
}

impl SurrealHandle {
    /// Connect to SurrealDB in-memory and set up schema
    #[instrument(skip_all)]
    pub async fn setup_db() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect_url("mem://").await
    }

    /// Open (or create) an on-disk SurrealKV database under `dir`.
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub async fn setup_path(dir: &Path) -> Result<Self> {
        info!("Opening SurrealDB (surrealkv)");
        Self::connect_url(&format!("surrealkv://{}", dir.display())).await
    }

    async fn connect_url(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        let handle = SurrealHandle { db };
        handle.init_schema().await?;

        info!("SurrealDB connected and schema initialized");
        Ok(handle)
    }

    /// Connect to a remote SurrealDB instance
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn setup_cloud(config: CloudConfig) -> Result<Self> {
        info!("Connecting to remote SurrealDB (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {}", e))
            })?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        let handle = SurrealHandle { db };
        handle.init_schema().await?;

        info!("Remote SurrealDB connected and schema initialized");
        Ok(handle)
    }

    /// Connect using environment variables
    ///
    /// If SURREALDB_ENDPOINT is set, connects to the remote instance.
    /// If SURREALDB_URL is set, connects to that URL.
    /// Otherwise, falls back to in-memory.
    #[instrument(skip_all)]
    pub async fn setup_from_env() -> Result<Self> {
        if let Ok(config) = CloudConfig::from_env() {
            info!("Remote config found");
            return Self::setup_cloud(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            return Self::connect_url(&url).await;
        }

        info!("No remote config found, using in-memory database");
        Self::setup_db().await
    }

    /// Initialize the database schema
    async fn init_schema(&self) -> Result<()> {
        debug!("Initializing berth schema");

        let schema = r#"
            -- Scoped key/value entries (one scope per release channel)
            DEFINE TABLE IF NOT EXISTS state SCHEMAFULL;
            DEFINE FIELD IF NOT EXISTS scope ON state TYPE string;
            DEFINE FIELD IF NOT EXISTS key ON state TYPE string;
            DEFINE FIELD IF NOT EXISTS payload ON state TYPE string;
            DEFINE FIELD IF NOT EXISTS updated_at ON state TYPE datetime;
            DEFINE INDEX IF NOT EXISTS idx_state_scope_key ON state FIELDS scope, key UNIQUE;
        "#;

        self.db
            .query(schema)
            .await
            .map_err(|e| StateError::SchemaSetup(e.to_string()))?
            .check()
            .map_err(|e| StateError::SchemaSetup(e.to_string()))?;

        debug!("Schema initialized successfully");
        Ok(())
    }

    // ========== Scoped State Operations ==========

    /// Read one key from a scope.
    #[instrument(skip(self), fields(scope = %scope, key = %key))]
    pub async fn state_get(&self, scope: &str, key: &str) -> StorageResult<Option<StoredEntry>> {
        let mut result = self
            .db
            .query("SELECT key, payload FROM state WHERE scope = $scope AND key = $key")
            .bind(("scope", scope.to_string()))
            .bind(("key", key.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<DbStateEntry> = result
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .next()
            .map(DbStateEntry::into_stored_entry)
            .transpose()
    }

    /// List every entry of a scope whose key starts with `prefix`, ordered by key.
    #[instrument(skip(self), fields(scope = %scope, prefix = %prefix))]
    pub async fn state_list(&self, scope: &str, prefix: &str) -> StorageResult<Vec<StoredEntry>> {
        let mut result = self
            .db
            .query(
                "SELECT key, payload FROM state \
                 WHERE scope = $scope AND string::starts_with(key, $prefix) \
                 ORDER BY key ASC",
            )
            .bind(("scope", scope.to_string()))
            .bind(("prefix", prefix.to_string()))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<DbStateEntry> = result
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut entries = rows
            .into_iter()
            .map(DbStateEntry::into_stored_entry)
            .collect::<StorageResult<Vec<_>>>()?;
        // Collation in the database is not guaranteed to be byte order.
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Apply a write batch to a scope inside a single transaction.
    #[instrument(skip(self, batch), fields(scope = %scope, writes = batch.len()))]
    pub async fn state_commit(&self, scope: &str, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        for op in batch.ops() {
            if let WriteOp::Create { key, .. } = op {
                if self.state_get(scope, key).await?.is_some() {
                    return Err(StorageError::KeyExists { key: key.clone() });
                }
            }
        }

        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for (i, op) in batch.ops().iter().enumerate() {
            let verb = match op {
                WriteOp::Put { .. } => "UPSERT",
                WriteOp::Create { .. } => "CREATE",
            };
            sql.push_str(&format!(
                "{verb} type::thing('state', [$scope, $k{i}]) CONTENT {{ \
                 scope: $scope, key: $k{i}, payload: $p{i}, updated_at: time::now() }};\n"
            ));
        }
        sql.push_str("COMMIT TRANSACTION;");

        let mut query = self.db.query(sql).bind(("scope", scope.to_string()));
        for (i, op) in batch.into_ops().into_iter().enumerate() {
            let payload = serde_json::to_string(op.value())?;
            query = query
                .bind((format!("k{i}"), op.key().to_string()))
                .bind((format!("p{i}"), payload));
        }

        query
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .check()
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        debug!("Batch committed");
        Ok(())
    }
}
