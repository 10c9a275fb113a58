//! Global atomic counters for judging activity.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI command).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    evaluations_recorded: AtomicU64,
    verdicts_recorded: AtomicU64,
    submissions_rejected: AtomicU64,
    tanks_assigned: AtomicU64,
    rounds_finalized: AtomicU64,
    entries_advanced: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            evaluations_recorded: AtomicU64::new(0),
            verdicts_recorded: AtomicU64::new(0),
            submissions_rejected: AtomicU64::new(0),
            tanks_assigned: AtomicU64::new(0),
            rounds_finalized: AtomicU64::new(0),
            entries_advanced: AtomicU64::new(0),
        }
    }

    pub fn inc_evaluations(&self) {
        self.evaluations_recorded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "evaluations_recorded", "counter incremented");
    }

    pub fn inc_verdicts(&self) {
        self.verdicts_recorded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "verdicts_recorded", "counter incremented");
    }

    /// Duplicate or otherwise rejected referee submissions.
    pub fn inc_rejected_submissions(&self) {
        self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "submissions_rejected", "counter incremented");
    }

    pub fn inc_tanks_assigned(&self) {
        self.tanks_assigned.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tanks_assigned", "counter incremented");
    }

    pub fn inc_rounds_finalized(&self) {
        self.rounds_finalized.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rounds_finalized", "counter incremented");
    }

    pub fn add_entries_advanced(&self, n: u64) {
        self.entries_advanced.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "entries_advanced", n, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            evaluations_recorded = self.evaluations_recorded(),
            verdicts_recorded = self.verdicts_recorded(),
            submissions_rejected = self.submissions_rejected(),
            tanks_assigned = self.tanks_assigned(),
            rounds_finalized = self.rounds_finalized(),
            entries_advanced = self.entries_advanced(),
        );
    }

    pub fn evaluations_recorded(&self) -> u64 {
        self.evaluations_recorded.load(Ordering::Relaxed)
    }

    pub fn verdicts_recorded(&self) -> u64 {
        self.verdicts_recorded.load(Ordering::Relaxed)
    }

    pub fn submissions_rejected(&self) -> u64 {
        self.submissions_rejected.load(Ordering::Relaxed)
    }

    pub fn tanks_assigned(&self) -> u64 {
        self.tanks_assigned.load(Ordering::Relaxed)
    }

    pub fn rounds_finalized(&self) -> u64 {
        self.rounds_finalized.load(Ordering::Relaxed)
    }

    pub fn entries_advanced(&self) -> u64 {
        self.entries_advanced.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.evaluations_recorded.store(0, Ordering::Relaxed);
        self.verdicts_recorded.store(0, Ordering::Relaxed);
        self.submissions_rejected.store(0, Ordering::Relaxed);
        self.tanks_assigned.store(0, Ordering::Relaxed);
        self.rounds_finalized.store(0, Ordering::Relaxed);
        self.entries_advanced.store(0, Ordering::Relaxed);
    }
}
