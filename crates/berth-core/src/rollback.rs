//! Rollback coordination.
//!
//! A rollback is planned in memory first and then staged as one
//! [`WriteBatch`]: the demoted release, the reinstated target, both
//! pointers and the audit record land together or not at all.

use berth_state::WriteBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deployment::{demote, reinstate};
use crate::domain::{Release, Result, RollbackRecord};
use crate::store::ReleaseStore;

/// Everything a rollback will write.
#[derive(Debug, Clone)]
pub struct RollbackPlan {
    /// The release that was current, now marked rolled back.
    pub demoted: Option<Release>,
    /// The target, redeployed as success.
    pub reinstated: Release,
    pub record: RollbackRecord,
}

/// Result returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub success: bool,
    pub previous_version: Option<String>,
    pub current_version: String,
}

impl RollbackPlan {
    /// Plan a rollback from `current` to `target`.
    ///
    /// Rolling back onto the release that is already current reinstates it
    /// without demoting it.
    pub fn new(current: Option<Release>, target: Release, reason: &str, now: DateTime<Utc>) -> Self {
        let from = current.as_ref().map(|r| r.version.clone());
        let demoted = current
            .filter(|r| r.version != target.version)
            .map(|mut r| {
                demote(&mut r, now);
                r
            });

        let mut reinstated = target;
        reinstate(&mut reinstated, now);

        let record = RollbackRecord {
            from,
            to: reinstated.version.clone(),
            reason: reason.to_string(),
            timestamp: now,
        };

        Self {
            demoted,
            reinstated,
            record,
        }
    }

    /// Stage every write of the plan into `batch`.
    pub fn stage(&self, store: &ReleaseStore, batch: &mut WriteBatch) -> Result<()> {
        if let Some(demoted) = &self.demoted {
            store.stage_release(batch, demoted)?;
        }
        store.stage_release(batch, &self.reinstated)?;
        let displaced = self
            .record
            .from
            .as_deref()
            .filter(|v| *v != self.reinstated.version);
        store.stage_current(batch, &self.reinstated.version, displaced)?;
        store.stage_audit(batch, &self.record)?;
        Ok(())
    }

    pub fn outcome(&self) -> RollbackOutcome {
        RollbackOutcome {
            success: true,
            previous_version: self.record.from.clone(),
            current_version: self.reinstated.version.clone(),
        }
    }
}
