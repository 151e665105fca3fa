//! Domain models for Berth.
//!
//! Canonical definitions for the core entities:
//! - `Release`: a published version with its changes, build and deployment state
//! - `ScheduledRelease`: a release waiting for its activation time
//! - `RollbackRecord`: immutable audit entry for a rollback

pub mod error;
pub mod release;
pub mod validation;

// Re-export main types and errors
pub use error::{BerthError, Result};
pub use release::{
    BuildInfo, Change, ChangeKind, DeploymentInfo, DeploymentStatus, Environment, NewRelease,
    Release, ReleaseMetrics, RollbackRecord, ScheduleStatus, ScheduledRelease,
};
pub use validation::{validate_release, ValidationReport};
