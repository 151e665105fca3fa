use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use berth_core::{ChannelRegistry, Settings};
use berth_state::fakes::MemoryStoreFactory;
use berthd::{app, AppState};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn router() -> Router {
    let registry = ChannelRegistry::new(
        Arc::new(MemoryStoreFactory::new()),
        Settings {
            simulated_deploy: None,
            ..Settings::default()
        },
    );
    app(AppState::new(Arc::new(registry)))
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap()
    }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Reply {
    call_with(app, method, uri, body, &[]).await
}

async fn call_with(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(header::HeaderName, &str)],
) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(name, *value);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    Reply {
        status,
        headers,
        body,
    }
}

fn release(version: &str, description: &str) -> Value {
    json!({
        "version": version,
        "author": "alice",
        "changes": [
            {"type": "fix", "category": "odds", "description": description}
        ],
        "build": {
            "hash": format!("sha-{version}"),
            "size": 2048,
            "durationMs": 3000,
            "artifacts": ["app.tar.gz"],
            "environment": "production"
        }
    })
}

async fn publish(app: &Router, version: &str) -> Reply {
    let reply = call(
        app,
        Method::POST,
        "/channels/main/releases",
        Some(release(version, &format!("fix in {version}"))),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text());
    reply
}

// ---------------------------------------------------------------------------
// Health and current
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthz_reports_ok() {
    let app = router();
    let reply = call(&app, Method::GET, "/healthz", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["status"], "ok");
    assert!(reply.json()["version"].is_string());
}

#[tokio::test]
async fn current_on_empty_channel_is_placeholder() {
    let app = router();
    let reply = call(&app, Method::GET, "/channels/main/current", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["version"], "0.0.0");
    assert!(reply.json()["message"].is_string());
}

#[tokio::test]
async fn publish_then_current() {
    let app = router();
    let created = publish(&app, "1.2.0").await.json();
    assert_eq!(created["version"], "1.2.0");
    assert_eq!(created["deployment"]["status"], "pending");

    let current = call(&app, Method::GET, "/channels/main/current", None).await;
    assert_eq!(current.json()["version"], "1.2.0");
}

#[tokio::test]
async fn malformed_channel_is_rejected() {
    let app = router();
    let reply = call(&app, Method::GET, "/channels/not.valid/current", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error"], "invalid_channel");
}

// ---------------------------------------------------------------------------
// Publish failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_publish_conflicts() {
    let app = router();
    publish(&app, "1.0.0").await;
    let reply = call(
        &app,
        Method::POST,
        "/channels/main/releases",
        Some(release("1.0.0", "again")),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.json()["error"], "conflict_error");
}

#[tokio::test]
async fn invalid_publish_lists_issues() {
    let app = router();
    let reply = call(
        &app,
        Method::POST,
        "/channels/main/releases",
        Some(json!({"version": "1.0"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let body = reply.json();
    assert_eq!(body["error"], "validation_error");
    assert!(body["issues"].as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn unparseable_body_is_bad_request() {
    let app = router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/channels/main/releases")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// History, rollback and audit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_pages_newest_first() {
    let app = router();
    for version in ["1.0.0", "1.1.0", "1.2.0"] {
        publish(&app, version).await;
    }
    let reply = call(&app, Method::GET, "/channels/main/history?limit=2&offset=0", None).await;
    let page = reply.json();
    assert_eq!(page["total"], 3);
    assert_eq!(page["limit"], 2);
    let versions: Vec<&str> = page["releases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["version"].as_str().unwrap())
        .collect();
    assert_eq!(versions, vec!["1.2.0", "1.1.0"]);

    let filtered = call(&app, Method::GET, "/channels/main/history?filter=breaking", None).await;
    assert_eq!(filtered.json()["total"], 0);
}

#[tokio::test]
async fn rollback_restores_target_and_audits() {
    let app = router();
    publish(&app, "1.0.0").await;
    publish(&app, "1.1.0").await;

    let reply = call(
        &app,
        Method::POST,
        "/channels/main/rollback",
        Some(json!({"version": "1.0.0", "reason": "error spike"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let outcome = reply.json();
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["previousVersion"], "1.1.0");
    assert_eq!(outcome["currentVersion"], "1.0.0");

    let current = call(&app, Method::GET, "/channels/main/current", None).await;
    assert_eq!(current.json()["version"], "1.0.0");
    assert_eq!(current.json()["deployment"]["status"], "success");

    let audit = call(&app, Method::GET, "/channels/main/audit", None).await.json();
    let records = audit.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["from"], "1.1.0");
    assert_eq!(records[0]["to"], "1.0.0");
    assert_eq!(records[0]["reason"], "error spike");
}

#[tokio::test]
async fn rollback_without_reason_uses_default() {
    let app = router();
    publish(&app, "1.0.0").await;
    call(
        &app,
        Method::POST,
        "/channels/main/rollback",
        Some(json!({"version": "1.0.0"})),
    )
    .await;
    let audit = call(&app, Method::GET, "/channels/main/audit", None).await.json();
    assert_eq!(audit[0]["reason"], "manual rollback");
}

#[tokio::test]
async fn rollback_to_unknown_version_is_not_found() {
    let app = router();
    let reply = call(
        &app,
        Method::POST,
        "/channels/main/rollback",
        Some(json!({"version": "9.9.9", "reason": "x"})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["error"], "not_found_error");
}

#[tokio::test]
async fn control_characters_in_version_are_not_found() {
    let app = router();
    publish(&app, "1.0.0").await;

    let rollback = call(
        &app,
        Method::POST,
        "/channels/main/rollback",
        Some(json!({"version": "1.0.0\n", "reason": "x"})),
    )
    .await;
    assert_eq!(rollback.status, StatusCode::NOT_FOUND);
    assert_eq!(rollback.json()["error"], "not_found_error");

    let metrics = call(
        &app,
        Method::GET,
        "/channels/main/metrics?version=1.0.0%09",
        None,
    )
    .await;
    assert_eq!(metrics.status, StatusCode::NOT_FOUND);

    let compare = call(
        &app,
        Method::GET,
        "/channels/main/compare?from=1.0.0&to=1.0.0%0A",
        None,
    )
    .await;
    assert_eq!(compare.status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Metrics and compare
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metrics_require_version_and_known_release() {
    let app = router();
    let missing = call(&app, Method::GET, "/channels/main/metrics", None).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let unknown = call(&app, Method::GET, "/channels/main/metrics?version=1.0.0", None).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    publish(&app, "1.0.0").await;
    let zeroed = call(&app, Method::GET, "/channels/main/metrics?version=1.0.0", None).await;
    assert_eq!(zeroed.status, StatusCode::OK);
    assert_eq!(zeroed.json()["downloads"], 0);

    let recorded = call(
        &app,
        Method::PUT,
        "/channels/main/metrics/1.0.0",
        Some(json!({"downloads": 42, "activeInstalls": 7, "errorRate": 0.5, "performanceScore": 91.0})),
    )
    .await;
    assert_eq!(recorded.status, StatusCode::OK);

    let stored = call(&app, Method::GET, "/channels/main/metrics?version=1.0.0", None).await;
    assert_eq!(stored.json()["downloads"], 42);
    assert_eq!(stored.json()["activeInstalls"], 7);
}

#[tokio::test]
async fn compare_reports_added_and_removed() {
    let app = router();
    publish(&app, "1.0.0").await;
    publish(&app, "1.1.0").await;

    let missing = call(&app, Method::GET, "/channels/main/compare?from=1.0.0", None).await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let unknown = call(
        &app,
        Method::GET,
        "/channels/main/compare?from=1.0.0&to=3.0.0",
        None,
    )
    .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);

    let diff = call(
        &app,
        Method::GET,
        "/channels/main/compare?from=1.0.0&to=1.1.0",
        None,
    )
    .await
    .json();
    assert_eq!(diff["direction"], 1);
    assert_eq!(diff["changes"]["added"].as_array().unwrap().len(), 1);
    assert_eq!(diff["changes"]["removed"].as_array().unwrap().len(), 1);
    assert_eq!(diff["buildSizeDelta"], 0);
}

// ---------------------------------------------------------------------------
// Changelog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn changelog_sets_content_type_and_etag() {
    let app = router();
    publish(&app, "1.0.0").await;

    let markdown = call(&app, Method::GET, "/channels/main/changelog", None).await;
    assert_eq!(markdown.status, StatusCode::OK);
    assert_eq!(
        markdown.headers[header::CONTENT_TYPE],
        "text/markdown; charset=utf-8"
    );
    assert!(markdown.text().starts_with("# Changelog"));
    let etag = markdown.headers[header::ETAG].to_str().unwrap().to_string();

    let again = call(&app, Method::GET, "/channels/main/changelog", None).await;
    assert_eq!(again.headers[header::ETAG], etag.as_str());

    let cached = call_with(
        &app,
        Method::GET,
        "/channels/main/changelog",
        None,
        &[(header::IF_NONE_MATCH, etag.as_str())],
    )
    .await;
    assert_eq!(cached.status, StatusCode::NOT_MODIFIED);
    assert!(cached.body.is_empty());

    let json_doc = call(&app, Method::GET, "/channels/main/changelog?format=json", None).await;
    assert_eq!(json_doc.headers[header::CONTENT_TYPE], "application/json");
    assert_eq!(json_doc.json()[0]["version"], "1.0.0");
}

#[tokio::test]
async fn changelog_rejects_unknown_format() {
    let app = router();
    let reply = call(&app, Method::GET, "/channels/main/changelog?format=xml", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn validate_reports_checks_or_issues() {
    let app = router();
    let ok = call(
        &app,
        Method::POST,
        "/channels/main/validate",
        Some(release("2.0.0", "ok")),
    )
    .await
    .json();
    assert_eq!(ok["valid"], true);
    assert_eq!(ok["checks"]["versionAvailable"], true);

    let bad = call(
        &app,
        Method::POST,
        "/channels/main/validate",
        Some(json!({"version": "x"})),
    )
    .await;
    assert_eq!(bad.status, StatusCode::OK);
    assert_eq!(bad.json()["valid"], false);
    assert!(!bad.json()["issues"].as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn schedule_list_and_cancel() {
    let app = router();
    let when = Utc::now() + Duration::hours(1);
    let reply = call(
        &app,
        Method::POST,
        "/channels/main/schedule",
        Some(json!({"release": release("3.0.0", "later"), "scheduledFor": when})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text());
    assert_eq!(reply.json()["success"], true);
    assert_eq!(reply.json()["version"], "3.0.0");
    assert!(reply.json()["scheduledFor"].is_string());

    let listed = call(&app, Method::GET, "/channels/main/schedule", None).await.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["status"], "pending");

    let cancelled = call(&app, Method::DELETE, "/channels/main/schedule/3.0.0", None).await;
    assert_eq!(cancelled.status, StatusCode::OK);
    assert_eq!(cancelled.json()["status"], "cancelled");

    let missing = call(&app, Method::DELETE, "/channels/main/schedule/4.0.0", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn schedule_in_the_past_is_rejected() {
    let app = router();
    let when = Utc::now() - Duration::minutes(5);
    let reply = call(
        &app,
        Method::POST,
        "/channels/main/schedule",
        Some(json!({"release": release("3.0.0", "late"), "scheduledFor": when})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["error"], "scheduling_error");
}

#[tokio::test]
async fn schedule_of_published_version_conflicts() {
    let app = router();
    publish(&app, "3.0.0").await;
    let when = Utc::now() + Duration::hours(1);
    let reply = call(
        &app,
        Method::POST,
        "/channels/main/schedule",
        Some(json!({"release": release("3.0.0", "dup"), "scheduledFor": when})),
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
}

// ---------------------------------------------------------------------------
// CI deployment reports
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ci_reports_drive_deployment_status() {
    let app = router();
    publish(&app, "1.0.0").await;

    let illegal = call(
        &app,
        Method::POST,
        "/channels/main/deployments/1.0.0",
        Some(json!({"status": "success"})),
    )
    .await;
    assert_eq!(illegal.status, StatusCode::BAD_REQUEST);
    assert_eq!(illegal.json()["error"], "invalid_transition");

    let started = call(
        &app,
        Method::POST,
        "/channels/main/deployments/1.0.0",
        Some(json!({"status": "in-progress"})),
    )
    .await;
    assert_eq!(started.status, StatusCode::OK);
    assert_eq!(started.json()["deployment"]["status"], "in-progress");

    let finished = call(
        &app,
        Method::POST,
        "/channels/main/deployments/1.0.0",
        Some(json!({"status": "success", "regions": ["eu-west-1"]})),
    )
    .await
    .json();
    assert_eq!(finished["deployment"]["status"], "success");
    assert_eq!(finished["deployment"]["regions"][0], "eu-west-1");

    let unknown = call(
        &app,
        Method::POST,
        "/channels/main/deployments/5.0.0",
        Some(json!({"status": "in-progress"})),
    )
    .await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn channels_are_isolated() {
    let app = router();
    publish(&app, "1.0.0").await;
    let other = call(&app, Method::GET, "/channels/other/current", None).await;
    assert_eq!(other.json()["version"], "0.0.0");
}
