//! Release payload validation.
//!
//! Every check runs and every failure is reported, so a caller fixing a
//! payload sees all problems at once. Publishing and scheduling refuse a
//! payload with any issue before touching storage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{BerthError, Result};
use super::release::NewRelease;
use crate::version::is_valid_version;

/// Outcome of validating a release payload.
///
/// Serializes as `{valid: false, issues: [...]}` or `{valid: true, checks: {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checks: Option<BTreeMap<String, bool>>,
}

impl ValidationReport {
    fn from_checks(checks: Vec<(&str, bool, String)>) -> Self {
        let issues: Vec<String> = checks
            .iter()
            .filter(|(_, ok, _)| !ok)
            .map(|(_, _, issue)| issue.clone())
            .collect();
        let valid = issues.is_empty();
        Self {
            valid,
            issues,
            checks: valid.then(|| {
                checks
                    .into_iter()
                    .map(|(name, ok, _)| (name.to_string(), ok))
                    .collect()
            }),
        }
    }

    /// Add a check that depends on stored state (e.g. version availability).
    pub fn with_check(mut self, name: &str, ok: bool, issue: impl Into<String>) -> Self {
        if ok {
            if let Some(checks) = self.checks.as_mut() {
                checks.insert(name.to_string(), true);
            }
        } else {
            self.valid = false;
            self.checks = None;
            self.issues.push(issue.into());
        }
        self
    }

    /// Convert into a `Result`, failing with every collected issue.
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(BerthError::Validation {
                issues: self.issues,
            })
        }
    }
}

/// Validate the intrinsic shape of a release payload.
pub fn validate_release(release: &NewRelease) -> ValidationReport {
    let blank_descriptions = release
        .changes
        .iter()
        .filter(|c| c.description.trim().is_empty())
        .count();

    ValidationReport::from_checks(vec![
        (
            "versionFormat",
            is_valid_version(&release.version),
            format!(
                "version '{}' must match major.minor.patch (optional -prerelease/+build)",
                release.version
            ),
        ),
        (
            "author",
            !release.author.trim().is_empty(),
            "author is required".to_string(),
        ),
        (
            "changes",
            !release.changes.is_empty(),
            "changes must contain at least one entry".to_string(),
        ),
        (
            "changeDescriptions",
            blank_descriptions == 0,
            format!("{blank_descriptions} change(s) have an empty description"),
        ),
        (
            "buildHash",
            !release.build.hash.trim().is_empty(),
            "build.hash is required".to_string(),
        ),
        (
            "buildSize",
            release.build.size > 0,
            "build.size must be positive".to_string(),
        ),
    ])
}
