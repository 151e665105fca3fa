//! The per-channel release actor.
//!
//! One tokio task owns a channel's [`ReleaseStore`], its subscribers, its
//! deployment jobs and its scheduler alarm. Callers talk to it through an
//! [`ActorHandle`]; every request is a [`Command`] carrying a oneshot
//! reply, and the task handles them one at a time in arrival order.
//!
//! The loop waits on three sources:
//!
//! - the command mailbox,
//! - [`DeploymentSignal`]s from simulated deployment jobs,
//! - the alarm, armed at the earliest pending schedule.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use berth_state::{StateStore, StorageError, WriteBatch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn, Instrument};

use crate::changelog::{self, ChangelogDocument, ChangelogQuery};
use crate::clock::Clock;
use crate::compare::ReleaseComparison;
use crate::deployment::{apply_report, DeploymentJob, DeploymentReport, DeploymentSignal};
use crate::domain::{
    validate_release, BerthError, ChangeKind, NewRelease, Release, ReleaseMetrics, Result,
    RollbackRecord, ScheduleStatus, ScheduledRelease, ValidationReport,
};
use crate::metrics::METRICS;
use crate::notify::{Notification, NotificationHub, SubscriberId};
use crate::obs;
use crate::rollback::{RollbackOutcome, RollbackPlan};
use crate::scheduler;
use crate::store::ReleaseStore;
use crate::version::{is_valid_version, PrereleasePolicy, VersionComparator};

const MAILBOX_CAPACITY: usize = 256;

/// Page size used when a history query does not name one.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;
/// Largest page a history query may request.
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Actor behaviour shared by every channel.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Delay before a simulated deployment reports success; `None` waits for CI.
    pub simulated_deploy: Option<Duration>,
    pub prerelease_policy: PrereleasePolicy,
    /// Back-off before retrying a failed alarm.
    pub alarm_retry: Duration,
    pub clock: Clock,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            simulated_deploy: Some(Duration::from_millis(5000)),
            prerelease_policy: PrereleasePolicy::default(),
            alarm_retry: Duration::from_secs(1),
            clock: Clock::System,
        }
    }
}

/// Paging and filtering for release history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub limit: usize,
    pub offset: usize,
    /// Keep only releases containing a change of this kind.
    pub filter: Option<ChangeKind>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            offset: 0,
            filter: None,
        }
    }
}

/// One page of history, newest version first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub releases: Vec<Release>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// What one alarm firing did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireSummary {
    pub deployed: Vec<String>,
    /// Due entries whose version had already been published.
    pub skipped: Vec<String>,
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests understood by a [`ReleaseActor`].
pub enum Command {
    GetCurrent {
        reply: Reply<Option<Release>>,
    },
    ListHistory {
        query: HistoryQuery,
        reply: Reply<HistoryPage>,
    },
    Publish {
        release: NewRelease,
        reply: Reply<Release>,
    },
    Rollback {
        version: String,
        reason: String,
        reply: Reply<RollbackOutcome>,
    },
    GetMetrics {
        version: String,
        reply: Reply<ReleaseMetrics>,
    },
    RecordMetrics {
        version: String,
        metrics: ReleaseMetrics,
        reply: Reply<ReleaseMetrics>,
    },
    Compare {
        from: String,
        to: String,
        reply: Reply<ReleaseComparison>,
    },
    Changelog {
        query: ChangelogQuery,
        reply: Reply<ChangelogDocument>,
    },
    Validate {
        release: NewRelease,
        reply: Reply<ValidationReport>,
    },
    Schedule {
        release: NewRelease,
        scheduled_for: DateTime<Utc>,
        reply: Reply<ScheduledRelease>,
    },
    CancelSchedule {
        version: String,
        reply: Reply<ScheduledRelease>,
    },
    ListScheduled {
        reply: Reply<Vec<ScheduledRelease>>,
    },
    ReportDeployment {
        version: String,
        report: DeploymentReport,
        reply: Reply<Release>,
    },
    AuditLog {
        limit: Option<usize>,
        offset: usize,
        reply: Reply<Vec<RollbackRecord>>,
    },
    Subscribe {
        sender: mpsc::Sender<String>,
        reply: oneshot::Sender<SubscriberId>,
    },
    Unsubscribe {
        id: SubscriberId,
    },
    /// Process due schedules now, as if the alarm had rung.
    FireAlarm {
        reply: Reply<FireSummary>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::GetCurrent { .. } => "get_current",
            Command::ListHistory { .. } => "list_history",
            Command::Publish { .. } => "publish",
            Command::Rollback { .. } => "rollback",
            Command::GetMetrics { .. } => "get_metrics",
            Command::RecordMetrics { .. } => "record_metrics",
            Command::Compare { .. } => "compare",
            Command::Changelog { .. } => "changelog",
            Command::Validate { .. } => "validate",
            Command::Schedule { .. } => "schedule",
            Command::CancelSchedule { .. } => "cancel_schedule",
            Command::ListScheduled { .. } => "list_scheduled",
            Command::ReportDeployment { .. } => "report_deployment",
            Command::AuditLog { .. } => "audit_log",
            Command::Subscribe { .. } => "subscribe",
            Command::Unsubscribe { .. } => "unsubscribe",
            Command::FireAlarm { .. } => "fire_alarm",
            Command::Shutdown { .. } => "shutdown",
        }
    }
}

fn not_found(version: &str) -> BerthError {
    BerthError::NotFound(format!("release {version} does not exist"))
}

async fn alarm_sleep(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending().await,
    }
}

/// Serialized owner of one channel's release state.
pub struct ReleaseActor {
    channel: String,
    store: ReleaseStore,
    hub: NotificationHub,
    settings: Settings,
    comparator: VersionComparator,
    jobs: HashMap<String, DeploymentJob>,
    signals_tx: mpsc::UnboundedSender<DeploymentSignal>,
    signals_rx: mpsc::UnboundedReceiver<DeploymentSignal>,
    alarm: Option<DateTime<Utc>>,
}

impl ReleaseActor {
    /// Start an actor for `channel` over `state` and return its handle.
    pub fn spawn(channel: &str, state: Arc<dyn StateStore>, settings: Settings) -> ActorHandle {
        let (tx, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        let actor = Self {
            channel: channel.to_string(),
            store: ReleaseStore::new(state),
            hub: NotificationHub::new(),
            comparator: VersionComparator::new(settings.prerelease_policy),
            settings,
            jobs: HashMap::new(),
            signals_tx,
            signals_rx,
            alarm: None,
        };
        tokio::spawn(actor.run(mailbox).instrument(obs::channel_span(channel)));
        ActorHandle {
            channel: Arc::from(channel),
            tx,
        }
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<Command>) {
        self.restore_alarm().await;
        obs::emit_actor_started(
            &self.channel,
            self.alarm.map(|at| at.to_rfc3339()).as_deref(),
        );

        let stopped_by = loop {
            let delay = self
                .alarm
                .map(|at| scheduler::delay_until(at, self.now()));
            tokio::select! {
                command = mailbox.recv() => match command {
                    Some(Command::Shutdown { reply }) => break Some(reply),
                    Some(command) => self.dispatch(command).await,
                    None => break None,
                },
                Some(signal) = self.signals_rx.recv() => self.on_signal(signal).await,
                _ = alarm_sleep(delay) => self.on_alarm().await,
            }
        };

        drop(mailbox);
        // Dropping the jobs aborts them.
        self.jobs.clear();
        obs::emit_actor_stopped(&self.channel);
        if let Some(reply) = stopped_by {
            let _ = reply.send(());
        }
    }

    /// Reload the persisted alarm, or rebuild it from the pending entries.
    async fn restore_alarm(&mut self) {
        let restored = match self.store.alarm().await {
            Ok(Some(at)) => Ok(Some(at)),
            Ok(None) => self
                .store
                .list_scheduled()
                .await
                .map(|entries| scheduler::next_alarm(&entries)),
            Err(e) => Err(e),
        };
        match restored {
            Ok(at) => self.alarm = at,
            Err(e) => {
                obs::emit_alarm_failed(&e, self.retry_ms());
                self.alarm = Some(self.now() + self.settings.alarm_retry);
            }
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.settings.clock.now()
    }

    fn retry_ms(&self) -> u64 {
        u64::try_from(self.settings.alarm_retry.as_millis()).unwrap_or(u64::MAX)
    }

    fn respond<T>(&self, operation: &'static str, reply: Reply<T>, result: Result<T>) {
        if let Err(e) = &result {
            if e.is_internal() {
                error!(channel = %self.channel, operation, error = %e, "operation failed");
            } else {
                debug!(channel = %self.channel, operation, error = %e, "request rejected");
            }
        }
        let _ = reply.send(result);
    }

    async fn dispatch(&mut self, command: Command) {
        let operation = command.name();
        match command {
            Command::GetCurrent { reply } => {
                let result = self.get_current().await;
                self.respond(operation, reply, result);
            }
            Command::ListHistory { query, reply } => {
                let result = self.list_history(query).await;
                self.respond(operation, reply, result);
            }
            Command::Publish { release, reply } => {
                let result = self.publish(release).await;
                self.respond(operation, reply, result);
            }
            Command::Rollback {
                version,
                reason,
                reply,
            } => {
                let result = self.rollback(&version, &reason).await;
                self.respond(operation, reply, result);
            }
            Command::GetMetrics { version, reply } => {
                let result = self.get_metrics(&version).await;
                self.respond(operation, reply, result);
            }
            Command::RecordMetrics {
                version,
                metrics,
                reply,
            } => {
                let result = self.record_metrics(&version, metrics).await;
                self.respond(operation, reply, result);
            }
            Command::Compare { from, to, reply } => {
                let result = self.compare(&from, &to).await;
                self.respond(operation, reply, result);
            }
            Command::Changelog { query, reply } => {
                let result = self.changelog(&query).await;
                self.respond(operation, reply, result);
            }
            Command::Validate { release, reply } => {
                let result = self.validate(&release).await;
                self.respond(operation, reply, result);
            }
            Command::Schedule {
                release,
                scheduled_for,
                reply,
            } => {
                let result = self.schedule(release, scheduled_for).await;
                self.respond(operation, reply, result);
            }
            Command::CancelSchedule { version, reply } => {
                let result = self.cancel_schedule(&version).await;
                self.respond(operation, reply, result);
            }
            Command::ListScheduled { reply } => {
                let result = self.list_scheduled().await;
                self.respond(operation, reply, result);
            }
            Command::ReportDeployment {
                version,
                report,
                reply,
            } => {
                let result = self.report_deployment(&version, report).await;
                self.respond(operation, reply, result);
            }
            Command::AuditLog {
                limit,
                offset,
                reply,
            } => {
                let result = self.store.audit_log(limit, offset).await;
                self.respond(operation, reply, result);
            }
            Command::Subscribe { sender, reply } => {
                let _ = reply.send(self.hub.subscribe(sender));
            }
            Command::Unsubscribe { id } => {
                self.hub.unsubscribe(id);
            }
            Command::FireAlarm { reply } => {
                let result = self.fire_alarm().await;
                self.respond(operation, reply, result);
            }
            // Handled by the run loop.
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn broadcast(&mut self, event: Notification) {
        if let Err(e) = self.hub.broadcast(&event) {
            warn!(channel = %self.channel, event = event.kind(), error = %e, "broadcast failed");
        }
    }

    fn start_job(&mut self, version: &str) {
        if let Some(delay) = self.settings.simulated_deploy {
            let job = DeploymentJob::simulate(version, delay, self.signals_tx.clone());
            if let Some(previous) = self.jobs.insert(version.to_string(), job) {
                previous.cancel();
            }
        }
    }

    fn cancel_job(&mut self, version: &str) {
        if let Some(job) = self.jobs.remove(version) {
            job.cancel();
        }
    }

    async fn ensure_unpublished(&self, version: &str) -> Result<()> {
        if self.store.contains(version).await? {
            return Err(BerthError::Conflict(format!(
                "release {version} already exists"
            )));
        }
        Ok(())
    }

    // ========== Queries ==========

    async fn get_current(&self) -> Result<Option<Release>> {
        let Some(mut release) = self.store.get_current().await? else {
            return Ok(None);
        };
        if let Some(metrics) = self.store.get_metrics(&release.version).await? {
            release.metrics = Some(metrics);
        }
        Ok(Some(release))
    }

    async fn list_history(&self, query: HistoryQuery) -> Result<HistoryPage> {
        let limit = query.limit.min(MAX_HISTORY_LIMIT);
        let mut releases: Vec<Release> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|r| query.filter.map_or(true, |kind| r.has_change_kind(kind)))
            .collect();
        releases.sort_by(|a, b| self.comparator.compare_strict(&b.version, &a.version));
        let total = releases.len();
        let releases = releases
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .collect();
        Ok(HistoryPage {
            releases,
            total,
            limit,
            offset: query.offset,
        })
    }

    async fn get_metrics(&self, version: &str) -> Result<ReleaseMetrics> {
        let release = self.store.get(version).await?.ok_or_else(|| not_found(version))?;
        Ok(self
            .store
            .get_metrics(version)
            .await?
            .or(release.metrics)
            .unwrap_or_default())
    }

    async fn record_metrics(&self, version: &str, metrics: ReleaseMetrics) -> Result<ReleaseMetrics> {
        if !self.store.contains(version).await? {
            return Err(not_found(version));
        }
        self.store.put_metrics(version, &metrics).await?;
        Ok(metrics)
    }

    async fn compare(&self, from: &str, to: &str) -> Result<ReleaseComparison> {
        let older = self.store.get(from).await?.ok_or_else(|| not_found(from))?;
        let newer = self.store.get(to).await?.ok_or_else(|| not_found(to))?;
        Ok(ReleaseComparison::between(&older, &newer, &self.comparator))
    }

    async fn changelog(&self, query: &ChangelogQuery) -> Result<ChangelogDocument> {
        let releases = self.store.list_all().await?;
        changelog::generate(&releases, query, &self.comparator)
    }

    async fn validate(&self, release: &NewRelease) -> Result<ValidationReport> {
        let report = validate_release(release);
        if !is_valid_version(&release.version) {
            return Ok(report);
        }
        let available = !self.store.contains(&release.version).await?;
        Ok(report.with_check(
            "versionAvailable",
            available,
            format!("release {} already exists", release.version),
        ))
    }

    async fn list_scheduled(&self) -> Result<Vec<ScheduledRelease>> {
        let mut entries = self.store.list_scheduled().await?;
        entries.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then_with(|| self.comparator.compare_strict(a.version(), b.version()))
        });
        Ok(entries)
    }

    // ========== Publish & deployment ==========

    async fn publish(&mut self, draft: NewRelease) -> Result<Release> {
        validate_release(&draft).into_result()?;
        let version = draft.version.clone();
        self.ensure_unpublished(&version).await?;
        if let Some(entry) = self.store.get_scheduled(&version).await? {
            if entry.status == ScheduleStatus::Pending {
                return Err(BerthError::Conflict(format!(
                    "release {version} is scheduled for {}",
                    entry.scheduled_for.to_rfc3339()
                )));
            }
        }

        let release = draft.into_release(self.now());
        let current = self.store.current_version().await?;
        let promoted = current
            .as_deref()
            .map_or(true, |current| self.comparator.is_newer(&version, current));

        let mut batch = WriteBatch::new();
        self.store.stage_new_release(&mut batch, &release)?;
        if promoted {
            self.store
                .stage_current(&mut batch, &version, current.as_deref())?;
        }
        self.store.commit(batch).await.map_err(|e| match e {
            BerthError::Storage(StorageError::KeyExists { .. }) => {
                BerthError::Conflict(format!("release {version} already exists"))
            }
            other => other,
        })?;

        self.start_job(&version);
        METRICS.inc_published();
        obs::emit_release_published(&version, &release.author, promoted);
        self.broadcast(Notification::ReleasePublished {
            release: release.clone(),
            promoted,
            timestamp: release.timestamp,
        });
        Ok(release)
    }

    /// Apply a deployment report and persist it.
    async fn record_deployment(
        &mut self,
        version: &str,
        report: &DeploymentReport,
        simulated: bool,
    ) -> Result<Release> {
        let mut release = self.store.get(version).await?.ok_or_else(|| not_found(version))?;
        let from = release.deployment.status;
        let now = self.now();
        apply_report(&mut release, report, now)?;
        if !simulated {
            self.cancel_job(version);
        }
        self.store.put(&release).await?;

        obs::emit_deployment_transition(version, from.as_str(), report.status.as_str(), simulated);
        if report.status.is_terminal() {
            self.jobs.remove(version);
            METRICS.inc_deployments_completed();
            self.broadcast(Notification::deployment_complete(version, report, now));
        }
        Ok(release)
    }

    async fn report_deployment(&mut self, version: &str, report: DeploymentReport) -> Result<Release> {
        self.record_deployment(version, &report, false).await
    }

    async fn on_signal(&mut self, signal: DeploymentSignal) {
        let current_job = self.jobs.get(&signal.version).map(DeploymentJob::id);
        if current_job != Some(signal.job_id) {
            debug!(version = %signal.version, job_id = %signal.job_id, "stale deployment signal ignored");
            return;
        }
        if let Err(e) = self
            .record_deployment(&signal.version, &signal.report, true)
            .await
        {
            warn!(
                channel = %self.channel,
                version = %signal.version,
                error = %e,
                "simulated deployment update failed"
            );
            self.jobs.remove(&signal.version);
        }
    }

    // ========== Rollback ==========

    async fn rollback(&mut self, version: &str, reason: &str) -> Result<RollbackOutcome> {
        let target = self.store.get(version).await?.ok_or_else(|| not_found(version))?;
        let current = self.store.get_current().await?;
        let plan = RollbackPlan::new(current, target, reason, self.now());

        let mut batch = WriteBatch::new();
        plan.stage(&self.store, &mut batch)?;
        self.store.commit(batch).await?;

        if let Some(demoted) = &plan.demoted {
            self.cancel_job(&demoted.version);
        }
        self.cancel_job(version);

        METRICS.inc_rollbacks();
        obs::emit_release_rolled_back(plan.record.from.as_deref(), version, reason);
        self.broadcast(Notification::rolled_back(&plan.record));
        Ok(plan.outcome())
    }

    // ========== Scheduling ==========

    /// Stage `next` as the alarm if it differs from the armed one.
    fn stage_alarm_change(&self, batch: &mut WriteBatch, next: Option<DateTime<Utc>>) -> Result<bool> {
        let changed = next != self.alarm;
        if changed {
            self.store.stage_alarm(batch, next)?;
        }
        Ok(changed)
    }

    fn arm(&mut self, next: Option<DateTime<Utc>>, changed: bool) {
        self.alarm = next;
        if changed {
            obs::emit_alarm_armed(next.map(|at| at.to_rfc3339()).as_deref());
        }
    }

    async fn schedule(&mut self, draft: NewRelease, scheduled_for: DateTime<Utc>) -> Result<ScheduledRelease> {
        validate_release(&draft).into_result()?;
        let now = self.now();
        scheduler::validate_activation(scheduled_for, now)?;
        self.ensure_unpublished(&draft.version).await?;

        let existing = self.store.get_scheduled(&draft.version).await?;
        let entry = scheduler::pending_entry(draft, scheduled_for, now);

        let next = match existing {
            Some(previous) if previous.status == ScheduleStatus::Pending => {
                let mut entries = self.store.list_scheduled().await?;
                entries.retain(|e| e.version() != entry.version());
                entries.push(entry.clone());
                scheduler::next_alarm(&entries)
            }
            _ if scheduler::should_rearm(self.alarm, scheduled_for) => Some(scheduled_for),
            _ => self.alarm,
        };

        let mut batch = WriteBatch::new();
        self.store.stage_scheduled(&mut batch, &entry)?;
        let changed = self.stage_alarm_change(&mut batch, next)?;
        self.store.commit(batch).await?;
        self.arm(next, changed);

        obs::emit_schedule_added(entry.version(), &scheduled_for.to_rfc3339());
        Ok(entry)
    }

    async fn cancel_schedule(&mut self, version: &str) -> Result<ScheduledRelease> {
        let mut entry = self
            .store
            .get_scheduled(version)
            .await?
            .ok_or_else(|| BerthError::NotFound(format!("no schedule for release {version}")))?;
        match entry.status {
            ScheduleStatus::Deployed => {
                return Err(BerthError::Conflict(format!(
                    "release {version} has already been deployed"
                )))
            }
            ScheduleStatus::Cancelled => return Ok(entry),
            ScheduleStatus::Pending => {}
        }

        entry.status = ScheduleStatus::Cancelled;
        entry.note = Some("cancelled on request".to_string());
        let mut entries = self.store.list_scheduled().await?;
        entries.retain(|e| e.version() != version);
        let next = scheduler::next_alarm(&entries);

        let mut batch = WriteBatch::new();
        self.store.stage_scheduled(&mut batch, &entry)?;
        let changed = self.stage_alarm_change(&mut batch, next)?;
        self.store.commit(batch).await?;
        self.arm(next, changed);
        Ok(entry)
    }

    async fn on_alarm(&mut self) {
        if let Err(e) = self.fire_alarm().await {
            obs::emit_alarm_failed(&e, self.retry_ms());
            self.alarm = Some(self.now() + self.settings.alarm_retry);
        }
    }

    /// Promote every due pending entry, then re-arm for the next one.
    ///
    /// Each entry is written in its own batch together with its `deployed`
    /// mark, so a repeated or interrupted firing never promotes it twice.
    async fn fire_alarm(&mut self) -> Result<FireSummary> {
        let now = self.now();
        let entries = self.store.list_scheduled().await?;
        let mut summary = FireSummary::default();

        for mut entry in scheduler::due_entries(entries, now, &self.comparator) {
            let version = entry.version().to_string();
            let mut batch = WriteBatch::new();

            if self.store.contains(&version).await? {
                entry.status = ScheduleStatus::Cancelled;
                entry.note = Some("release was published before its scheduled time".to_string());
                self.store.stage_scheduled(&mut batch, &entry)?;
                self.store.commit(batch).await?;
                summary.skipped.push(version);
                continue;
            }

            let release = entry.release.clone().into_release(now);
            let displaced = self.store.current_version().await?;
            self.store.stage_new_release(&mut batch, &release)?;
            self.store
                .stage_current(&mut batch, &version, displaced.as_deref())?;
            entry.status = ScheduleStatus::Deployed;
            self.store.stage_scheduled(&mut batch, &entry)?;
            self.store.commit(batch).await?;

            self.start_job(&version);
            METRICS.inc_schedules_fired();
            self.broadcast(Notification::ScheduledReleaseDeployed {
                release,
                scheduled_for: entry.scheduled_for,
                timestamp: now,
            });
            summary.deployed.push(version);
        }

        let remaining = self.store.list_scheduled().await?;
        let next = scheduler::next_alarm(&remaining);
        let mut batch = WriteBatch::new();
        let stored = self.store.alarm().await?;
        if stored != next {
            self.store.stage_alarm(&mut batch, next)?;
            self.store.commit(batch).await?;
        }
        let changed = next != self.alarm;
        self.arm(next, changed);

        obs::emit_schedule_fired(summary.deployed.len(), summary.skipped.len());
        Ok(summary)
    }
}

/// Cloneable client for one [`ReleaseActor`].
#[derive(Debug, Clone)]
pub struct ActorHandle {
    channel: Arc<str>,
    tx: mpsc::Sender<Command>,
}

impl ActorHandle {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the actor task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn unavailable(&self) -> BerthError {
        BerthError::ActorUnavailable(format!("actor for channel {} has stopped", self.channel))
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())?
    }

    pub async fn get_current(&self) -> Result<Option<Release>> {
        self.request(|reply| Command::GetCurrent { reply }).await
    }

    pub async fn current_version(&self) -> Result<Option<String>> {
        Ok(self.get_current().await?.map(|r| r.version))
    }

    pub async fn list_history(&self, query: HistoryQuery) -> Result<HistoryPage> {
        self.request(|reply| Command::ListHistory { query, reply })
            .await
    }

    pub async fn publish(&self, release: NewRelease) -> Result<Release> {
        self.request(|reply| Command::Publish { release, reply })
            .await
    }

    pub async fn rollback(&self, version: &str, reason: &str) -> Result<RollbackOutcome> {
        self.request(|reply| Command::Rollback {
            version: version.to_string(),
            reason: reason.to_string(),
            reply,
        })
        .await
    }

    pub async fn get_metrics(&self, version: &str) -> Result<ReleaseMetrics> {
        self.request(|reply| Command::GetMetrics {
            version: version.to_string(),
            reply,
        })
        .await
    }

    pub async fn record_metrics(&self, version: &str, metrics: ReleaseMetrics) -> Result<ReleaseMetrics> {
        self.request(|reply| Command::RecordMetrics {
            version: version.to_string(),
            metrics,
            reply,
        })
        .await
    }

    pub async fn compare(&self, from: &str, to: &str) -> Result<ReleaseComparison> {
        self.request(|reply| Command::Compare {
            from: from.to_string(),
            to: to.to_string(),
            reply,
        })
        .await
    }

    pub async fn changelog(&self, query: ChangelogQuery) -> Result<ChangelogDocument> {
        self.request(|reply| Command::Changelog { query, reply })
            .await
    }

    pub async fn validate(&self, release: NewRelease) -> Result<ValidationReport> {
        self.request(|reply| Command::Validate { release, reply })
            .await
    }

    pub async fn schedule(
        &self,
        release: NewRelease,
        scheduled_for: DateTime<Utc>,
    ) -> Result<ScheduledRelease> {
        self.request(|reply| Command::Schedule {
            release,
            scheduled_for,
            reply,
        })
        .await
    }

    pub async fn cancel_schedule(&self, version: &str) -> Result<ScheduledRelease> {
        self.request(|reply| Command::CancelSchedule {
            version: version.to_string(),
            reply,
        })
        .await
    }

    pub async fn list_scheduled(&self) -> Result<Vec<ScheduledRelease>> {
        self.request(|reply| Command::ListScheduled { reply }).await
    }

    pub async fn report_deployment(&self, version: &str, report: DeploymentReport) -> Result<Release> {
        self.request(|reply| Command::ReportDeployment {
            version: version.to_string(),
            report,
            reply,
        })
        .await
    }

    pub async fn audit_log(&self, limit: Option<usize>, offset: usize) -> Result<Vec<RollbackRecord>> {
        self.request(|reply| Command::AuditLog {
            limit,
            offset,
            reply,
        })
        .await
    }

    pub async fn fire_alarm(&self) -> Result<FireSummary> {
        self.request(|reply| Command::FireAlarm { reply }).await
    }

    /// Register a live connection; events arrive on the matching receiver.
    pub async fn subscribe(&self, sender: mpsc::Sender<String>) -> Result<SubscriberId> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Subscribe { sender, reply })
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    pub async fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.tx.send(Command::Unsubscribe { id }).await;
    }

    /// Stop the actor after the commands already queued. Running
    /// deployment jobs are cancelled.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }
}
