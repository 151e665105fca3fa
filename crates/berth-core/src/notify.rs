//! Live notification fan-out.
//!
//! The hub is a plain field of its actor: it is created empty with the
//! actor, never persisted, and dropped with it. Each subscriber is the
//! sending half of a bounded channel whose receiver is drained by the
//! connection's writer task, so a broadcast never waits on the network.
//! A subscriber whose queue is full is treated like a closed one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Sender};

use crate::deployment::DeploymentReport;
use crate::domain::{DeploymentStatus, Release, Result, RollbackRecord};
use crate::metrics::METRICS;
use crate::obs;

/// Identifies one live connection within its actor.
pub type SubscriberId = u64;

/// Frames a subscriber may have queued before it is dropped.
pub const SUBSCRIBER_QUEUE: usize = 64;

/// Queue for one live connection; hand the sender to [`NotificationHub::subscribe`].
pub fn subscriber_channel() -> (Sender<String>, mpsc::Receiver<String>) {
    mpsc::channel(SUBSCRIBER_QUEUE)
}

/// Server-pushed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    ReleasePublished {
        release: Release,
        promoted: bool,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ReleaseRolledBack {
        from: Option<String>,
        to: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    DeploymentComplete {
        version: String,
        status: DeploymentStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        errors: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        regions: Option<Vec<String>>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    ScheduledReleaseDeployed {
        release: Release,
        scheduled_for: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
}

impl Notification {
    pub fn rolled_back(record: &RollbackRecord) -> Self {
        Notification::ReleaseRolledBack {
            from: record.from.clone(),
            to: record.to.clone(),
            reason: record.reason.clone(),
            timestamp: record.timestamp,
        }
    }

    pub fn deployment_complete(version: &str, report: &DeploymentReport, now: DateTime<Utc>) -> Self {
        Notification::DeploymentComplete {
            version: version.to_string(),
            status: report.status,
            errors: report.errors.clone(),
            regions: report.regions.clone(),
            timestamp: now,
        }
    }

    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::ReleasePublished { .. } => "release-published",
            Notification::ReleaseRolledBack { .. } => "release-rolled-back",
            Notification::DeploymentComplete { .. } => "deployment-complete",
            Notification::ScheduledReleaseDeployed { .. } => "scheduled-release-deployed",
        }
    }
}

/// Messages a client may send on the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe,
    Ping,
}

/// Direct replies to a client message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Subscribed { current_version: Option<String> },
    Pong,
    Error { message: String },
}

impl ClientMessage {
    /// Parse an inbound frame; malformed input becomes the `error` reply to send back.
    pub fn parse(raw: &str) -> std::result::Result<Self, ServerMessage> {
        serde_json::from_str(raw).map_err(|e| ServerMessage::Error {
            message: format!("unrecognised message: {e}"),
        })
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Set of live connections owned by one actor.
#[derive(Debug, Default)]
pub struct NotificationHub {
    next_id: SubscriberId,
    subscribers: BTreeMap<SubscriberId, Sender<String>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, sender: Sender<String>) -> SubscriberId {
        self.next_id += 1;
        self.subscribers.insert(self.next_id, sender);
        self.next_id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver `event` to every subscriber, dropping those whose connection
    /// has gone away or stopped reading. Returns the number of successful
    /// deliveries.
    pub fn broadcast(&mut self, event: &Notification) -> Result<usize> {
        let frame = serde_json::to_string(event)?;
        let mut dead = Vec::new();
        for (id, sender) in &self.subscribers {
            if sender.try_send(frame.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in &dead {
            self.subscribers.remove(id);
            obs::emit_subscriber_dropped(*id);
        }
        METRICS.inc_broadcasts();
        METRICS.add_subscribers_dropped(dead.len() as u64);
        tracing::debug!(event = event.kind(), delivered = self.subscribers.len(), "broadcast");
        Ok(self.subscribers.len())
    }
}
