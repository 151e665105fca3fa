//! Release-to-release comparison.

use serde::{Deserialize, Serialize};

use crate::domain::{Change, Release};
use crate::version::VersionComparator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDiff {
    /// Changes in `to` with no match in `from`.
    pub added: Vec<Change>,
    /// Changes in `from` with no match in `to`.
    pub removed: Vec<Change>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseComparison {
    pub from: String,
    pub to: String,
    pub changes: ChangeDiff,
    pub build_size_delta: i64,
    pub time_delta_seconds: i64,
    /// `1` when `to` is newer than `from`, `-1` when older, `0` when equal.
    pub direction: i32,
}

fn missing_from(source: &[Change], other: &[Change]) -> Vec<Change> {
    source
        .iter()
        .filter(|c| !other.iter().any(|o| o.same_change(c)))
        .cloned()
        .collect()
}

impl ReleaseComparison {
    pub fn between(from: &Release, to: &Release, comparator: &VersionComparator) -> Self {
        let size = |r: &Release| i64::try_from(r.build.size).unwrap_or(i64::MAX);
        Self {
            from: from.version.clone(),
            to: to.version.clone(),
            changes: ChangeDiff {
                added: missing_from(&to.changes, &from.changes),
                removed: missing_from(&from.changes, &to.changes),
            },
            build_size_delta: size(to).saturating_sub(size(from)),
            time_delta_seconds: (to.timestamp - from.timestamp).num_seconds(),
            direction: comparator.compare_i32(&to.version, &from.version),
        }
    }
}
