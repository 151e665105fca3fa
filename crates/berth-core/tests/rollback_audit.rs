use std::sync::Arc;

use berth_core::{
    ActorHandle, BerthError, BuildInfo, Change, ChangeKind, DeploymentStatus, NewRelease,
    ReleaseActor, ReleaseStore, Settings,
};
use berth_state::fakes::MemoryStateStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn spawn_on(state: Arc<MemoryStateStore>) -> ActorHandle {
    ReleaseActor::spawn(
        "payments",
        state,
        Settings {
            simulated_deploy: None,
            ..Settings::default()
        },
    )
}

fn draft(version: &str) -> NewRelease {
    NewRelease {
        version: version.to_string(),
        author: "ops".to_string(),
        changes: vec![Change::new(ChangeKind::Fix, "ledger", format!("fix in {version}"))],
        build: BuildInfo {
            hash: format!("sha-{version}"),
            size: 512,
            ..Default::default()
        },
        metrics: None,
    }
}

async fn publish_all(actor: &ActorHandle, versions: &[&str]) {
    for version in versions {
        actor.publish(draft(version)).await.unwrap();
    }
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rollback_swaps_current_and_writes_one_audit_record() {
    let actor = spawn_on(Arc::new(MemoryStateStore::new()));
    publish_all(&actor, &["1.0.0", "1.1.0"]).await;

    let outcome = actor.rollback("1.0.0", "regression").await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.previous_version.as_deref(), Some("1.1.0"));
    assert_eq!(outcome.current_version, "1.0.0");

    let current = actor.get_current().await.unwrap().unwrap();
    assert_eq!(current.version, "1.0.0");
    assert_eq!(current.deployment.status, DeploymentStatus::Success);
    assert!(current.deployment.end_time.is_some());

    let audit = actor.audit_log(None, 0).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].from.as_deref(), Some("1.1.0"));
    assert_eq!(audit[0].to, "1.0.0");
    assert_eq!(audit[0].reason, "regression");
}

#[tokio::test]
async fn displaced_release_is_marked_rolled_back() {
    let state = Arc::new(MemoryStateStore::new());
    let actor = spawn_on(state.clone());
    publish_all(&actor, &["1.0.0", "1.1.0"]).await;
    actor.rollback("1.0.0", "regression").await.unwrap();

    let store = ReleaseStore::new(state);
    let demoted = store.get("1.1.0").await.unwrap().unwrap();
    assert_eq!(demoted.deployment.status, DeploymentStatus::RolledBack);
    assert_eq!(store.previous_version().await.unwrap().as_deref(), Some("1.1.0"));
}

#[tokio::test]
async fn every_rollback_appends_exactly_one_record() {
    let actor = spawn_on(Arc::new(MemoryStateStore::new()));
    publish_all(&actor, &["1.0.0", "1.1.0", "1.2.0"]).await;

    actor.rollback("1.1.0", "bad metrics").await.unwrap();
    actor.rollback("1.1.0", "again").await.unwrap();
    actor.rollback("1.0.0", "worse").await.unwrap();

    assert_eq!(actor.current_version().await.unwrap().as_deref(), Some("1.0.0"));
    let audit = actor.audit_log(None, 0).await.unwrap();
    let reasons: Vec<_> = audit.iter().map(|r| r.reason.as_str()).collect();
    assert_eq!(reasons, vec!["bad metrics", "again", "worse"]);

    let paged = actor.audit_log(Some(1), 1).await.unwrap();
    assert_eq!(paged[0].reason, "again");
}

#[tokio::test]
async fn rollback_to_unknown_version_is_not_found_and_writes_nothing() {
    let actor = spawn_on(Arc::new(MemoryStateStore::new()));
    publish_all(&actor, &["1.0.0"]).await;

    assert!(matches!(
        actor.rollback("0.9.0", "nope").await,
        Err(BerthError::NotFound(_))
    ));
    assert_eq!(actor.current_version().await.unwrap().as_deref(), Some("1.0.0"));
    assert!(actor.audit_log(None, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn control_characters_in_version_are_not_found() {
    let actor = spawn_on(Arc::new(MemoryStateStore::new()));
    publish_all(&actor, &["1.0.0", "1.1.0"]).await;

    assert!(matches!(
        actor.rollback("1.0.0\n", "x").await,
        Err(BerthError::NotFound(_))
    ));
    assert!(matches!(
        actor.get_metrics("1.0.0\t").await,
        Err(BerthError::NotFound(_))
    ));
    assert!(matches!(
        actor.compare("1.0.0", "1.1.0\r").await,
        Err(BerthError::NotFound(_))
    ));
    assert!(matches!(
        actor.cancel_schedule("2.0.0\0").await,
        Err(BerthError::NotFound(_))
    ));
    assert_eq!(actor.current_version().await.unwrap().as_deref(), Some("1.1.0"));
    assert!(actor.audit_log(None, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_commit_leaves_pointer_and_audit_untouched() {
    let state = Arc::new(MemoryStateStore::new());
    let actor = spawn_on(state.clone());
    publish_all(&actor, &["1.0.0", "1.1.0"]).await;

    state.fail_commits(true);
    assert!(matches!(
        actor.rollback("1.0.0", "regression").await,
        Err(BerthError::Storage(_))
    ));
    state.fail_commits(false);

    assert_eq!(actor.current_version().await.unwrap().as_deref(), Some("1.1.0"));
    assert!(actor.audit_log(None, 0).await.unwrap().is_empty());
    let store = ReleaseStore::new(state);
    assert_eq!(
        store.get("1.1.0").await.unwrap().unwrap().deployment.status,
        DeploymentStatus::Pending
    );
}
