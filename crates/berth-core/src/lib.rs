//! Berth Core Library
//!
//! Release coordination for a single channel at a time: a version
//! registry, deployment state machine, scheduler with one durable alarm,
//! atomic rollbacks with an audit trail, changelogs and live
//! notifications, all serialized through a per-channel actor.

pub mod actor;
pub mod changelog;
pub mod clock;
pub mod compare;
pub mod deployment;
pub mod domain;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod registry;
pub mod rollback;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod version;

pub use actor::{
    ActorHandle, Command, FireSummary, HistoryPage, HistoryQuery, ReleaseActor, Settings,
    DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT,
};
pub use changelog::{ChangelogDocument, ChangelogFormat, ChangelogQuery};
pub use clock::Clock;
pub use compare::{ChangeDiff, ReleaseComparison};
pub use deployment::{DeploymentJob, DeploymentReport, DeploymentSignal};
pub use domain::{
    validate_release, BerthError, BuildInfo, Change, ChangeKind, DeploymentInfo,
    DeploymentStatus, Environment, NewRelease, Release, ReleaseMetrics, Result, RollbackRecord,
    ScheduleStatus, ScheduledRelease, ValidationReport,
};
pub use metrics::{Metrics, METRICS};
pub use notify::{
    subscriber_channel, ClientMessage, Notification, NotificationHub, ServerMessage, SubscriberId,
    SUBSCRIBER_QUEUE,
};
pub use registry::ChannelRegistry;
pub use rollback::{RollbackOutcome, RollbackPlan};
pub use store::ReleaseStore;
pub use telemetry::init_tracing;
pub use version::{
    compare_versions, is_valid_version, InvalidVersion, PrereleasePolicy, Version,
    VersionComparator,
};

pub use obs::{
    channel_span, emit_actor_started, emit_actor_stopped, emit_alarm_armed, emit_alarm_failed,
    emit_deployment_transition, emit_release_published, emit_release_rolled_back,
    emit_schedule_added, emit_schedule_fired, emit_subscriber_dropped,
};

pub use berth_state::{StateStore, StoreFactory, SurrealHandle, SurrealStoreFactory};
