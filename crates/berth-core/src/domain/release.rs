//! Release records, deployment state, and scheduling entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a single change. Declaration order is the changelog section order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Breaking,
    Security,
    Feature,
    Enhancement,
    Fix,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 5] = [
        ChangeKind::Breaking,
        ChangeKind::Security,
        ChangeKind::Feature,
        ChangeKind::Enhancement,
        ChangeKind::Fix,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Breaking => "breaking",
            ChangeKind::Security => "security",
            ChangeKind::Feature => "feature",
            ChangeKind::Enhancement => "enhancement",
            ChangeKind::Fix => "fix",
        }
    }

    /// Section heading used by rendered changelogs.
    pub fn heading(self) -> &'static str {
        match self {
            ChangeKind::Breaking => "Breaking Changes",
            ChangeKind::Security => "Security",
            ChangeKind::Feature => "Features",
            ChangeKind::Enhancement => "Enhancements",
            ChangeKind::Fix => "Bug Fixes",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChangeKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown change kind: {s}"))
    }
}

/// One entry in a release's change list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(rename = "type", alias = "kind")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<String>,
}

impl Change {
    pub fn new(kind: ChangeKind, category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            category: category.into(),
            description: description.into(),
            issue: None,
            pull_request: None,
        }
    }

    /// Two changes describe the same thing when kind, category and description match.
    pub fn same_change(&self, other: &Change) -> bool {
        self.kind == other.kind
            && self.category == other.category
            && self.description == other.description
    }
}

/// Target environment of a build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    #[default]
    Production,
}

/// Build artifact facts reported by CI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildInfo {
    pub hash: String,
    /// Artifact size in bytes.
    pub size: u64,
    /// Build duration in milliseconds.
    pub duration_ms: u64,
    pub artifacts: Vec<String>,
    pub environment: Environment,
}

/// Deployment lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    RolledBack,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::InProgress => "in-progress",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::RolledBack => "rolled-back",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::RolledBack
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment state of a release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl DeploymentInfo {
    /// A fresh deployment waiting for CI, started at `now`.
    pub fn pending(now: DateTime<Utc>) -> Self {
        Self {
            status: DeploymentStatus::Pending,
            start_time: Some(now),
            end_time: None,
            regions: None,
            errors: None,
        }
    }
}

/// Usage figures collected after release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseMetrics {
    pub downloads: u64,
    pub active_installs: u64,
    pub error_rate: f64,
    pub performance_score: f64,
}

/// Caller-supplied release payload.
///
/// Every field defaults so that an incomplete payload still deserializes
/// and can be reported on field by field by validation. `timestamp` and
/// `deployment` in the payload are ignored; the actor assigns them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct NewRelease {
    pub version: String,
    pub author: String,
    pub changes: Vec<Change>,
    pub build: BuildInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ReleaseMetrics>,
}

impl NewRelease {
    /// Stamp the payload into a stored release created at `now`.
    pub fn into_release(self, now: DateTime<Utc>) -> Release {
        Release {
            version: self.version,
            timestamp: now,
            author: self.author,
            changes: self.changes,
            build: self.build,
            deployment: DeploymentInfo::pending(now),
            metrics: self.metrics,
        }
    }
}

/// A published release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub changes: Vec<Change>,
    pub build: BuildInfo,
    pub deployment: DeploymentInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ReleaseMetrics>,
}

impl Release {
    pub fn has_change_kind(&self, kind: ChangeKind) -> bool {
        self.changes.iter().any(|c| c.kind == kind)
    }
}

/// Status of a scheduled entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleStatus {
    Pending,
    Deployed,
    Cancelled,
}

/// A release waiting for its activation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledRelease {
    pub release: NewRelease,
    pub scheduled_for: DateTime<Utc>,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ScheduledRelease {
    pub fn version(&self) -> &str {
        &self.release.version
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduleStatus::Pending && self.scheduled_for <= now
    }
}

/// Immutable audit entry written by every rollback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRecord {
    pub from: Option<String>,
    pub to: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
