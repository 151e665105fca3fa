//! Structured lifecycle events for release coordination.
//!
//! Every event carries an `event` field (`release.published`,
//! `release.rolled_back`, ...) so log pipelines can filter on it. Actor
//! work runs inside [`channel_span`], which tags it with the channel.

use tracing::{info, warn, Span};

/// Span covering everything an actor does for `channel`.
pub fn channel_span(channel: &str) -> Span {
    tracing::info_span!("berth.channel", channel = %channel)
}

pub fn emit_actor_started(channel: &str, alarm: Option<&str>) {
    info!(event = "actor.started", channel = %channel, alarm = alarm.unwrap_or("none"));
}

pub fn emit_actor_stopped(channel: &str) {
    info!(event = "actor.stopped", channel = %channel);
}

pub fn emit_release_published(version: &str, author: &str, promoted: bool) {
    info!(
        event = "release.published",
        version = %version,
        author = %author,
        promoted = promoted,
    );
}

pub fn emit_release_rolled_back(from: Option<&str>, to: &str, reason: &str) {
    info!(
        event = "release.rolled_back",
        from = from.unwrap_or("none"),
        to = %to,
        reason = %reason,
    );
}

pub fn emit_deployment_transition(version: &str, from: &str, to: &str, simulated: bool) {
    info!(
        event = "deployment.transition",
        version = %version,
        from = %from,
        to = %to,
        simulated = simulated,
    );
}

pub fn emit_schedule_added(version: &str, scheduled_for: &str) {
    info!(event = "schedule.added", version = %version, scheduled_for = %scheduled_for);
}

pub fn emit_schedule_fired(deployed: usize, skipped: usize) {
    info!(event = "schedule.fired", deployed = deployed, skipped = skipped);
}

pub fn emit_alarm_armed(at: Option<&str>) {
    info!(event = "alarm.armed", at = at.unwrap_or("none"));
}

/// Alarm processing failed; it will be retried after `retry_ms`.
pub fn emit_alarm_failed(error: &dyn std::fmt::Display, retry_ms: u64) {
    warn!(event = "alarm.failed", error = %error, retry_ms = retry_ms);
}

pub fn emit_subscriber_dropped(subscriber: u64) {
    warn!(event = "subscriber.dropped", subscriber = subscriber);
}
