//! Process-wide release counters.
//!
//! Incremented at the call site without logging; [`Metrics::flush`] emits
//! all values as one `info!` event (the daemon does so on shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    releases_published: AtomicU64,
    rollbacks: AtomicU64,
    schedules_fired: AtomicU64,
    deployments_completed: AtomicU64,
    broadcasts: AtomicU64,
    subscribers_dropped: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            releases_published: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            schedules_fired: AtomicU64::new(0),
            deployments_completed: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            subscribers_dropped: AtomicU64::new(0),
        }
    }

    pub fn inc_published(&self) {
        self.releases_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_schedules_fired(&self) {
        self.schedules_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deployments_completed(&self) {
        self.deployments_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_broadcasts(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `n` subscribers removed after failed deliveries.
    pub fn add_subscribers_dropped(&self, n: u64) {
        self.subscribers_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            releases_published = self.releases_published(),
            rollbacks = self.rollbacks(),
            schedules_fired = self.schedules_fired(),
            deployments_completed = self.deployments_completed(),
            broadcasts = self.broadcasts(),
            subscribers_dropped = self.subscribers_dropped(),
        );
    }

    pub fn releases_published(&self) -> u64 {
        self.releases_published.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    pub fn schedules_fired(&self) -> u64 {
        self.schedules_fired.load(Ordering::Relaxed)
    }

    pub fn deployments_completed(&self) -> u64 {
        self.deployments_completed.load(Ordering::Relaxed)
    }

    pub fn broadcasts(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }

    pub fn subscribers_dropped(&self) -> u64 {
        self.subscribers_dropped.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        for counter in [
            &self.releases_published,
            &self.rollbacks,
            &self.schedules_fired,
            &self.deployments_completed,
            &self.broadcasts,
            &self.subscribers_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
