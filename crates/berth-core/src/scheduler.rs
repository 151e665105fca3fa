//! Deferred activation of releases.
//!
//! The actor keeps exactly one alarm: the earliest `scheduled_for` among
//! pending entries. These helpers decide when to arm it and which entries
//! a firing should promote; the actor performs the writes.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{BerthError, NewRelease, Result, ScheduleStatus, ScheduledRelease};
use crate::version::VersionComparator;

/// Reject activation times that are not strictly in the future.
pub fn validate_activation(scheduled_for: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if scheduled_for <= now {
        return Err(BerthError::Scheduling(format!(
            "scheduled time {} must be in the future",
            scheduled_for.to_rfc3339()
        )));
    }
    Ok(())
}

/// New pending entry for `release`.
pub fn pending_entry(
    release: NewRelease,
    scheduled_for: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ScheduledRelease {
    ScheduledRelease {
        release,
        scheduled_for,
        status: ScheduleStatus::Pending,
        created_at: now,
        note: None,
    }
}

/// Earliest activation time among pending entries.
pub fn next_alarm<'a>(entries: impl IntoIterator<Item = &'a ScheduledRelease>) -> Option<DateTime<Utc>> {
    entries
        .into_iter()
        .filter(|e| e.status == ScheduleStatus::Pending)
        .map(|e| e.scheduled_for)
        .min()
}

/// Whether adding an entry at `candidate` must re-arm an alarm currently at `armed`.
pub fn should_rearm(armed: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> bool {
    armed.map_or(true, |at| candidate < at)
}

/// Pending entries due at `now`, in ascending version order.
pub fn due_entries(
    entries: Vec<ScheduledRelease>,
    now: DateTime<Utc>,
    comparator: &VersionComparator,
) -> Vec<ScheduledRelease> {
    let mut due: Vec<_> = entries.into_iter().filter(|e| e.is_due(now)).collect();
    due.sort_by(|a, b| comparator.compare_strict(a.version(), b.version()));
    due
}

/// Wall-clock delay until `at`; zero if it has passed.
pub fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}
