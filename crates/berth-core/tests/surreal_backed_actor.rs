//! The actor over the SurrealDB backend rather than the in-memory fake.

use std::sync::Arc;
use std::time::Duration;

use berth_core::{BuildInfo, Change, ChangeKind, ChannelRegistry, NewRelease, Settings};
use berth_state::{SurrealHandle, SurrealStoreFactory};
use chrono::{Duration as ChronoDuration, Utc};

fn draft(version: &str) -> NewRelease {
    NewRelease {
        version: version.to_string(),
        author: "ci".to_string(),
        changes: vec![Change::new(ChangeKind::Fix, "core", format!("fix {version}"))],
        build: BuildInfo {
            hash: format!("sha-{version}"),
            size: 100,
            ..Default::default()
        },
        metrics: None,
    }
}

fn settings() -> Settings {
    Settings {
        simulated_deploy: None,
        ..Settings::default()
    }
}

#[tokio::test]
async fn publish_rollback_and_schedule_over_surreal_mem() {
    let handle = Arc::new(SurrealHandle::setup_db().await.expect("surreal mem"));
    let registry = ChannelRegistry::new(Arc::new(SurrealStoreFactory::new(handle)), settings());
    let actor = registry.actor("arcade").await.unwrap();

    actor.publish(draft("1.0.0")).await.unwrap();
    actor.publish(draft("1.1.0")).await.unwrap();
    actor.rollback("1.0.0", "regression").await.unwrap();
    assert_eq!(actor.current_version().await.unwrap().as_deref(), Some("1.0.0"));
    assert_eq!(actor.audit_log(None, 0).await.unwrap().len(), 1);

    actor
        .schedule(draft("2.0.0"), Utc::now() + ChronoDuration::milliseconds(200))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(actor.current_version().await.unwrap().as_deref(), Some("2.0.0"));

    registry.shutdown().await;
}

#[tokio::test]
async fn channels_are_isolated_in_one_database() {
    let handle = Arc::new(SurrealHandle::setup_db().await.expect("surreal mem"));
    let registry = ChannelRegistry::new(Arc::new(SurrealStoreFactory::new(handle)), settings());

    let web = registry.actor("web").await.unwrap();
    let tv = registry.actor("tv").await.unwrap();
    web.publish(draft("5.0.0")).await.unwrap();

    assert!(tv.get_current().await.unwrap().is_none());
    assert_eq!(tv.list_history(Default::default()).await.unwrap().total, 0);
    registry.shutdown().await;
}

#[tokio::test]
async fn on_disk_store_keeps_state_across_actor_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let handle = Arc::new(SurrealHandle::setup_path(dir.path()).await.expect("surrealkv"));
    let registry = ChannelRegistry::new(Arc::new(SurrealStoreFactory::new(handle)), settings());

    let first = registry.actor("bingo").await.unwrap();
    first.publish(draft("3.2.1")).await.unwrap();
    first.shutdown().await;

    let second = registry.actor("bingo").await.unwrap();
    assert_eq!(second.current_version().await.unwrap().as_deref(), Some("3.2.1"));
    registry.shutdown().await;
}
