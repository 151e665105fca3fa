//! Request/response routes, one per actor operation.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use berth_core::{
    ActorHandle, ChangeKind, ChangelogFormat, ChangelogQuery, ChannelRegistry, DeploymentReport,
    HistoryQuery, NewRelease, ReleaseMetrics, DEFAULT_HISTORY_LIMIT,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::ws;

const DEFAULT_ROLLBACK_REASON: &str = "manual rollback";

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ChannelRegistry>,
}

impl AppState {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }

    async fn actor(&self, channel: &str) -> Result<ActorHandle, ApiError> {
        Ok(self.registry.actor(channel).await?)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Build the daemon's router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/channels/{channel}/current", get(current))
        .route("/channels/{channel}/history", get(history))
        .route("/channels/{channel}/releases", post(publish))
        .route("/channels/{channel}/rollback", post(rollback))
        .route("/channels/{channel}/metrics", get(get_metrics))
        .route("/channels/{channel}/metrics/{version}", put(record_metrics))
        .route("/channels/{channel}/compare", get(compare))
        .route("/channels/{channel}/changelog", get(changelog))
        .route("/channels/{channel}/validate", post(validate))
        .route("/channels/{channel}/schedule", post(schedule).get(list_scheduled))
        .route("/channels/{channel}/schedule/{version}", delete(cancel_schedule))
        .route("/channels/{channel}/deployments/{version}", post(report_deployment))
        .route("/channels/{channel}/audit", get(audit_log))
        .route("/channels/{channel}/ws", get(ws::upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn current(State(state): State<AppState>, Path(channel): Path<String>) -> ApiResult<Response> {
    let actor = state.actor(&channel).await?;
    let response = match actor.get_current().await? {
        Some(release) => Json(release).into_response(),
        None => Json(json!({
            "version": "0.0.0",
            "message": "no release has been published on this channel",
        }))
        .into_response(),
    };
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
    offset: Option<usize>,
    filter: Option<ChangeKind>,
}

async fn history(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let query = HistoryQuery {
        limit: params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        offset: params.offset.unwrap_or(0),
        filter: params.filter,
    };
    let page = state.actor(&channel).await?.list_history(query).await?;
    Ok(Json(page).into_response())
}

async fn publish(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Result<Json<NewRelease>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(release) = body?;
    let stored = state.actor(&channel).await?.publish(release).await?;
    Ok((StatusCode::CREATED, Json(stored)).into_response())
}

#[derive(Debug, Deserialize)]
struct RollbackRequest {
    version: String,
    #[serde(default)]
    reason: Option<String>,
}

async fn rollback(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Result<Json<RollbackRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body?;
    let reason = request
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ROLLBACK_REASON.to_string());
    let outcome = state
        .actor(&channel)
        .await?
        .rollback(&request.version, &reason)
        .await?;
    Ok(Json(outcome).into_response())
}

#[derive(Debug, Deserialize)]
struct MetricsParams {
    version: Option<String>,
}

async fn get_metrics(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    params: Result<Query<MetricsParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let version = params
        .version
        .ok_or_else(|| ApiError::bad_request("query parameter 'version' is required"))?;
    let metrics = state.actor(&channel).await?.get_metrics(&version).await?;
    Ok(Json(metrics).into_response())
}

async fn record_metrics(
    State(state): State<AppState>,
    Path((channel, version)): Path<(String, String)>,
    body: Result<Json<ReleaseMetrics>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(metrics) = body?;
    let stored = state
        .actor(&channel)
        .await?
        .record_metrics(&version, metrics)
        .await?;
    Ok(Json(stored).into_response())
}

#[derive(Debug, Deserialize)]
struct CompareParams {
    from: Option<String>,
    to: Option<String>,
}

async fn compare(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    params: Result<Query<CompareParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let (Some(from), Some(to)) = (params.from, params.to) else {
        return Err(ApiError::bad_request(
            "query parameters 'from' and 'to' are required",
        ));
    };
    let comparison = state.actor(&channel).await?.compare(&from, &to).await?;
    Ok(Json(comparison).into_response())
}

#[derive(Debug, Deserialize)]
struct ChangelogParams {
    format: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

async fn changelog(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    params: Result<Query<ChangelogParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let format = match params.format.as_deref() {
        Some(raw) => raw.parse::<ChangelogFormat>()?,
        None => ChangelogFormat::default(),
    };
    let query = ChangelogQuery {
        format,
        from: params.from,
        to: params.to,
    };
    let document = state.actor(&channel).await?.changelog(query).await?;

    let etag = format!("\"{}\"", document.digest());
    let matches = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag || tag.trim() == "*"));
    if matches {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    Ok((
        [
            (header::CONTENT_TYPE, document.content_type().to_string()),
            (header::ETAG, etag),
        ],
        document.body,
    )
        .into_response())
}

async fn validate(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Result<Json<NewRelease>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(release) = body?;
    let report = state.actor(&channel).await?.validate(release).await?;
    Ok(Json(report).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleRequest {
    release: NewRelease,
    scheduled_for: DateTime<Utc>,
}

async fn schedule(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    body: Result<Json<ScheduleRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = body?;
    let entry = state
        .actor(&channel)
        .await?
        .schedule(request.release, request.scheduled_for)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "version": entry.version(),
            "scheduledFor": entry.scheduled_for,
        })),
    )
        .into_response())
}

async fn list_scheduled(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> ApiResult<Response> {
    let entries = state.actor(&channel).await?.list_scheduled().await?;
    Ok(Json(entries).into_response())
}

async fn cancel_schedule(
    State(state): State<AppState>,
    Path((channel, version)): Path<(String, String)>,
) -> ApiResult<Response> {
    let entry = state.actor(&channel).await?.cancel_schedule(&version).await?;
    Ok(Json(entry).into_response())
}

async fn report_deployment(
    State(state): State<AppState>,
    Path((channel, version)): Path<(String, String)>,
    body: Result<Json<DeploymentReport>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(report) = body?;
    let release = state
        .actor(&channel)
        .await?
        .report_deployment(&version, report)
        .await?;
    Ok(Json(release).into_response())
}

#[derive(Debug, Deserialize)]
struct AuditParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn audit_log(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    params: Result<Query<AuditParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let records = state
        .actor(&channel)
        .await?
        .audit_log(params.limit, params.offset.unwrap_or(0))
        .await?;
    Ok(Json(records).into_response())
}
