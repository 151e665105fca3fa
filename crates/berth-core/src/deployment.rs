//! Deployment lifecycle.
//!
//! ```text
//! pending ──► in-progress ──► success ──► rolled-back
//!                        └──► failed
//! ```
//!
//! Normal reports may only follow the arrows above. Rollback uses the
//! privileged [`demote`] and [`reinstate`] instead.
//!
//! A [`DeploymentJob`] stands in for the CI system until a real report
//! arrives: it sends [`DeploymentSignal`]s back into the owning actor's
//! queue, and is aborted as soon as an external report, a rollback or
//! actor shutdown makes it redundant.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{BerthError, DeploymentStatus, Release, Result};

/// Whether a reported move from `from` to `to` is allowed.
pub fn can_transition(from: DeploymentStatus, to: DeploymentStatus) -> bool {
    use DeploymentStatus::*;
    matches!(
        (from, to),
        (Pending, InProgress) | (InProgress, Success) | (InProgress, Failed)
    )
}

/// Status update from CI (or from the simulated job).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
}

impl DeploymentReport {
    pub fn status(status: DeploymentStatus) -> Self {
        Self {
            status,
            errors: None,
            regions: None,
        }
    }
}

/// Apply a reported status to a release, rejecting illegal moves.
pub fn apply_report(release: &mut Release, report: &DeploymentReport, now: DateTime<Utc>) -> Result<()> {
    let from = release.deployment.status;
    if !can_transition(from, report.status) {
        return Err(BerthError::InvalidTransition {
            version: release.version.clone(),
            from,
            to: report.status,
        });
    }

    let deployment = &mut release.deployment;
    deployment.status = report.status;
    if deployment.start_time.is_none() {
        deployment.start_time = Some(now);
    }
    if report.status.is_terminal() {
        deployment.end_time = Some(now);
    }
    if report.regions.is_some() {
        deployment.regions = report.regions.clone();
    }
    if report.errors.is_some() {
        deployment.errors = report.errors.clone();
    }
    Ok(())
}

/// Mark a release displaced by a rollback. Returns `false` if it already was.
pub fn demote(release: &mut Release, now: DateTime<Utc>) -> bool {
    if release.deployment.status == DeploymentStatus::RolledBack {
        return false;
    }
    release.deployment.status = DeploymentStatus::RolledBack;
    release.deployment.end_time = Some(now);
    true
}

/// Overwrite a rollback target's deployment as freshly succeeded.
pub fn reinstate(release: &mut Release, now: DateTime<Utc>) {
    let deployment = &mut release.deployment;
    deployment.status = DeploymentStatus::Success;
    deployment.start_time = Some(now);
    deployment.end_time = Some(now);
    deployment.errors = None;
}

/// A report produced by a [`DeploymentJob`], tagged with the job that sent it.
#[derive(Debug, Clone)]
pub struct DeploymentSignal {
    pub job_id: Uuid,
    pub version: String,
    pub report: DeploymentReport,
}

/// Handle to a background deployment routine. Dropping it cancels the routine.
#[derive(Debug)]
pub struct DeploymentJob {
    id: Uuid,
    version: String,
    task: JoinHandle<()>,
}

impl DeploymentJob {
    /// Simulate CI: report `in-progress` now and `success` after `delay`.
    pub fn simulate(
        version: &str,
        delay: Duration,
        signals: mpsc::UnboundedSender<DeploymentSignal>,
    ) -> Self {
        let id = Uuid::new_v4();
        let job_version = version.to_string();
        let task = tokio::spawn(async move {
            let send = |status| {
                signals.send(DeploymentSignal {
                    job_id: id,
                    version: job_version.clone(),
                    report: DeploymentReport::status(status),
                })
            };
            if send(DeploymentStatus::InProgress).is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            let _ = send(DeploymentStatus::Success);
        });
        debug!(version = %version, job_id = %id, "deployment job started");
        Self {
            id,
            version: version.to_string(),
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn cancel(self) {
        debug!(version = %self.version, job_id = %self.id, "deployment job cancelled");
        // Drop aborts the task.
    }
}

impl Drop for DeploymentJob {
    fn drop(&mut self) {
        self.task.abort();
    }
}
