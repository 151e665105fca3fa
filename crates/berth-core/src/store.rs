//! Typed release storage over a channel's [`StateStore`].
//!
//! Key layout:
//!
//! | key | value |
//! |---|---|
//! | `release:<version>` | [`Release`] |
//! | `current`, `previous` | `{ "version": .. }` pointer |
//! | `scheduled:<version>` | [`ScheduledRelease`] |
//! | `audit:<nanos>:<uuid>` | [`RollbackRecord`] (create-only) |
//! | `metrics:<version>` | [`ReleaseMetrics`] |
//! | `alarm` | next scheduler fire time, or `null` |
//!
//! Reads go straight to the store. Writes are staged into a [`WriteBatch`]
//! and committed together, so a multi-key update is never half-applied.

use std::sync::Arc;

use berth_state::{validate_key, StateStore, WriteBatch};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Release, ReleaseMetrics, Result, RollbackRecord, ScheduledRelease};

const RELEASE_PREFIX: &str = "release:";
const SCHEDULED_PREFIX: &str = "scheduled:";
const AUDIT_PREFIX: &str = "audit:";
const METRICS_PREFIX: &str = "metrics:";
const CURRENT_KEY: &str = "current";
const PREVIOUS_KEY: &str = "previous";
const ALARM_KEY: &str = "alarm";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Pointer {
    version: String,
}

fn release_key(version: &str) -> String {
    format!("{RELEASE_PREFIX}{version}")
}

fn scheduled_key(version: &str) -> String {
    format!("{SCHEDULED_PREFIX}{version}")
}

fn metrics_key(version: &str) -> String {
    format!("{METRICS_PREFIX}{version}")
}

/// Audit keys sort chronologically; the uuid keeps same-instant records apart.
fn audit_key(at: DateTime<Utc>) -> String {
    let nanos = at.timestamp_nanos_opt().unwrap_or(i64::MAX).max(0);
    format!("{AUDIT_PREFIX}{nanos:020}:{}", Uuid::new_v4().simple())
}

/// Release registry over one channel's state.
#[derive(Clone)]
pub struct ReleaseStore {
    state: Arc<dyn StateStore>,
}

impl ReleaseStore {
    pub fn new(state: Arc<dyn StateStore>) -> Self {
        Self { state }
    }

    /// A key no backend can hold names nothing, so it reads as absent.
    async fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if validate_key(key).is_err() {
            return Ok(None);
        }
        match self.state.get(key).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    async fn read_prefix<T: DeserializeOwned>(
        &self,
        prefix: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<T>> {
        self.state
            .list(prefix, limit, offset)
            .await?
            .into_iter()
            .map(|entry| serde_json::from_value(entry.value).map_err(Into::into))
            .collect()
    }

    /// Apply staged writes atomically.
    pub async fn commit(&self, batch: WriteBatch) -> Result<()> {
        self.state.commit(batch).await?;
        Ok(())
    }

    // ========== Releases ==========

    pub async fn get(&self, version: &str) -> Result<Option<Release>> {
        self.read(&release_key(version)).await
    }

    pub async fn contains(&self, version: &str) -> Result<bool> {
        let key = release_key(version);
        if validate_key(&key).is_err() {
            return Ok(false);
        }
        Ok(self.state.get(&key).await?.is_some())
    }

    /// Releases whose version starts with `prefix`, in key order.
    pub async fn list_by_prefix(
        &self,
        prefix: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<Release>> {
        self.read_prefix(&release_key(prefix), limit, offset).await
    }

    pub async fn list_all(&self) -> Result<Vec<Release>> {
        self.list_by_prefix("", None, 0).await
    }

    pub fn stage_release(&self, batch: &mut WriteBatch, release: &Release) -> Result<()> {
        batch.put(release_key(&release.version), release)?;
        Ok(())
    }

    /// Stage a first write of `release`; the commit fails if the version exists.
    pub fn stage_new_release(&self, batch: &mut WriteBatch, release: &Release) -> Result<()> {
        batch.create(release_key(&release.version), release)?;
        Ok(())
    }

    /// Store a release immediately.
    pub async fn put(&self, release: &Release) -> Result<()> {
        let mut batch = WriteBatch::new();
        self.stage_release(&mut batch, release)?;
        self.commit(batch).await
    }

    // ========== Current / previous pointers ==========

    pub async fn current_version(&self) -> Result<Option<String>> {
        Ok(self.read::<Pointer>(CURRENT_KEY).await?.map(|p| p.version))
    }

    pub async fn previous_version(&self) -> Result<Option<String>> {
        Ok(self.read::<Pointer>(PREVIOUS_KEY).await?.map(|p| p.version))
    }

    pub async fn get_current(&self) -> Result<Option<Release>> {
        match self.current_version().await? {
            Some(version) => self.get(&version).await,
            None => Ok(None),
        }
    }

    /// Point `current` at `version`, moving the dislodged pointer to `previous`.
    pub fn stage_current(
        &self,
        batch: &mut WriteBatch,
        version: &str,
        displaced: Option<&str>,
    ) -> Result<()> {
        batch.put(
            CURRENT_KEY,
            &Pointer {
                version: version.to_string(),
            },
        )?;
        if let Some(previous) = displaced {
            batch.put(
                PREVIOUS_KEY,
                &Pointer {
                    version: previous.to_string(),
                },
            )?;
        }
        Ok(())
    }

    /// Make `release` current immediately.
    pub async fn set_current(&self, release: &Release) -> Result<()> {
        let displaced = self.current_version().await?;
        let mut batch = WriteBatch::new();
        self.stage_current(&mut batch, &release.version, displaced.as_deref())?;
        self.commit(batch).await
    }

    // ========== Scheduled entries ==========

    pub async fn get_scheduled(&self, version: &str) -> Result<Option<ScheduledRelease>> {
        self.read(&scheduled_key(version)).await
    }

    pub async fn list_scheduled(&self) -> Result<Vec<ScheduledRelease>> {
        self.read_prefix(SCHEDULED_PREFIX, None, 0).await
    }

    pub fn stage_scheduled(&self, batch: &mut WriteBatch, entry: &ScheduledRelease) -> Result<()> {
        batch.put(scheduled_key(entry.version()), entry)?;
        Ok(())
    }

    // ========== Alarm ==========

    pub async fn alarm(&self) -> Result<Option<DateTime<Utc>>> {
        self.read(ALARM_KEY).await
    }

    pub fn stage_alarm(&self, batch: &mut WriteBatch, at: Option<DateTime<Utc>>) -> Result<()> {
        batch.put(ALARM_KEY, &at)?;
        Ok(())
    }

    // ========== Audit ==========

    /// Append an audit record; audit keys are create-only.
    pub fn stage_audit(&self, batch: &mut WriteBatch, record: &RollbackRecord) -> Result<()> {
        batch.create(audit_key(record.timestamp), record)?;
        Ok(())
    }

    /// Audit records, oldest first.
    pub async fn audit_log(&self, limit: Option<usize>, offset: usize) -> Result<Vec<RollbackRecord>> {
        self.read_prefix(AUDIT_PREFIX, limit, offset).await
    }

    // ========== Metrics ==========

    pub async fn get_metrics(&self, version: &str) -> Result<Option<ReleaseMetrics>> {
        self.read(&metrics_key(version)).await
    }

    pub async fn put_metrics(&self, version: &str, metrics: &ReleaseMetrics) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(metrics_key(version), metrics)?;
        self.commit(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildInfo, Change, ChangeKind, NewRelease};
    use berth_state::fakes::MemoryStateStore;

    fn release(version: &str) -> Release {
        NewRelease {
            version: version.to_string(),
            author: "ci".to_string(),
            changes: vec![Change::new(ChangeKind::Fix, "core", "fix")],
            build: BuildInfo {
                hash: "abc".to_string(),
                size: 1,
                ..Default::default()
            },
            metrics: None,
        }
        .into_release(Utc::now())
    }

    fn store() -> ReleaseStore {
        ReleaseStore::new(Arc::new(MemoryStateStore::new()))
    }

    #[tokio::test]
    async fn put_get_and_prefix_listing() {
        let store = store();
        for v in ["1.0.0", "1.1.0", "2.0.0"] {
            store.put(&release(v)).await.unwrap();
        }

        assert_eq!(store.get("1.1.0").await.unwrap().unwrap().version, "1.1.0");
        assert!(store.get("3.0.0").await.unwrap().is_none());

        let ones: Vec<String> = store
            .list_by_prefix("1.", None, 0)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(ones, vec!["1.0.0", "1.1.0"]);

        let paged = store.list_by_prefix("", Some(1), 2).await.unwrap();
        assert_eq!(paged[0].version, "2.0.0");
    }

    #[tokio::test]
    async fn new_release_never_overwrites() {
        let store = store();
        store.put(&release("1.0.0")).await.unwrap();

        let mut batch = WriteBatch::new();
        store.stage_new_release(&mut batch, &release("1.0.0")).unwrap();
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(
            err,
            crate::domain::BerthError::Storage(berth_state::StorageError::KeyExists { .. })
        ));
    }

    #[tokio::test]
    async fn unaddressable_versions_read_as_absent() {
        let store = store();
        store.put(&release("1.0.0")).await.unwrap();

        for version in ["1.0.0\n", "1.0.0\t", "\u{7f}"] {
            assert!(store.get(version).await.unwrap().is_none());
            assert!(!store.contains(version).await.unwrap());
            assert!(store.get_metrics(version).await.unwrap().is_none());
            assert!(store.get_scheduled(version).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn set_current_stashes_previous() {
        let store = store();
        let first = release("1.0.0");
        let second = release("1.0.1");
        store.put(&first).await.unwrap();
        store.put(&second).await.unwrap();

        store.set_current(&first).await.unwrap();
        assert!(store.previous_version().await.unwrap().is_none());

        store.set_current(&second).await.unwrap();
        assert_eq!(store.current_version().await.unwrap().as_deref(), Some("1.0.1"));
        assert_eq!(store.previous_version().await.unwrap().as_deref(), Some("1.0.0"));
        assert_eq!(store.get_current().await.unwrap().unwrap().version, "1.0.1");
    }

    #[tokio::test]
    async fn alarm_can_be_cleared() {
        let store = store();
        let at = Utc::now();
        let mut batch = WriteBatch::new();
        store.stage_alarm(&mut batch, Some(at)).unwrap();
        store.commit(batch).await.unwrap();
        assert_eq!(store.alarm().await.unwrap(), Some(at));

        let mut batch = WriteBatch::new();
        store.stage_alarm(&mut batch, None).unwrap();
        store.commit(batch).await.unwrap();
        assert_eq!(store.alarm().await.unwrap(), None);
    }

    #[tokio::test]
    async fn audit_records_at_same_instant_do_not_collide() {
        let store = store();
        let at = Utc::now();
        for to in ["1.0.0", "1.1.0"] {
            let mut batch = WriteBatch::new();
            store
                .stage_audit(
                    &mut batch,
                    &RollbackRecord {
                        from: None,
                        to: to.to_string(),
                        reason: "test".to_string(),
                        timestamp: at,
                    },
                )
                .unwrap();
            store.commit(batch).await.unwrap();
        }
        let log = store.audit_log(None, 0).await.unwrap();
        assert_eq!(log.len(), 2);
    }
}
