//! Domain-level error taxonomy for Berth.

use berth_state::StorageError;

use super::release::DeploymentStatus;

/// Berth domain errors.
#[derive(Debug, thiserror::Error)]
pub enum BerthError {
    #[error("invalid release: {}", issues.join("; "))]
    Validation { issues: Vec<String> },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("scheduling error: {0}")]
    Scheduling(String),

    #[error("release {version}: cannot move deployment from {from} to {to}")]
    InvalidTransition {
        version: String,
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    #[error("release actor unavailable: {0}")]
    ActorUnavailable(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BerthError {
    /// Machine-readable kind used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            BerthError::Validation { .. } => "validation_error",
            BerthError::Conflict(_) => "conflict_error",
            BerthError::NotFound(_) => "not_found_error",
            BerthError::Scheduling(_) => "scheduling_error",
            BerthError::InvalidTransition { .. } => "invalid_transition",
            BerthError::InvalidChannel(_) => "invalid_channel",
            BerthError::ActorUnavailable(_) => "unavailable",
            BerthError::Storage(_) | BerthError::Serialization(_) => "internal_error",
        }
    }

    /// Whether the failure originates inside Berth rather than in the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BerthError::Storage(_) | BerthError::Serialization(_) | BerthError::ActorUnavailable(_)
        )
    }
}

/// Result type for Berth domain operations.
pub type Result<T> = std::result::Result<T, BerthError>;
