//! HTTP error mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use berth_core::BerthError;
use serde_json::json;

/// A [`BerthError`] on its way to becoming a response.
#[derive(Debug)]
pub struct ApiError(pub BerthError);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError(BerthError::Validation {
            issues: vec![message.into()],
        })
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            BerthError::Validation { .. }
            | BerthError::Scheduling(_)
            | BerthError::InvalidTransition { .. }
            | BerthError::InvalidChannel(_) => StatusCode::BAD_REQUEST,
            BerthError::Conflict(_) => StatusCode::CONFLICT,
            BerthError::NotFound(_) => StatusCode::NOT_FOUND,
            BerthError::ActorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BerthError::Storage(_) | BerthError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<BerthError> for ApiError {
    fn from(err: BerthError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        }
        let body = match &self.0 {
            BerthError::Validation { issues } => json!({
                "error": self.0.kind(),
                "message": self.0.to_string(),
                "issues": issues,
            }),
            other => json!({
                "error": other.kind(),
                "message": other.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}
