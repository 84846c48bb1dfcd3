//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics so a status reader never contends with the control loop.
//! All counters are monotonic except the per-report frame counter.
//!
//! NOTE: All atomics use Relaxed ordering intentionally; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Lock-free metrics collector
pub struct Metrics {
    /// Frames processed after decimation (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Per-identity state updates (monotonic)
    tracks_updated_total: AtomicU64,
    /// Identities removed by staleness pruning (monotonic)
    pruned_total: AtomicU64,
    /// Assistance candidate events raised by the trigger (monotonic)
    events_triggered_total: AtomicU64,
    /// Events accepted as alerts (monotonic)
    alerts_total: AtomicU64,
    /// Decisions served by the local heuristic (monotonic)
    decision_fallbacks_total: AtomicU64,
    /// Root-cause clusters emitted (monotonic)
    clusters_total: AtomicU64,
    /// Outcome records scored (monotonic)
    outcomes_total: AtomicU64,
    /// Optimizer invocations (monotonic)
    optimizations_total: AtomicU64,
    /// Frames where the external tracker lacked identities (monotonic)
    tracker_fallback_frames_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            tracks_updated_total: AtomicU64::new(0),
            pruned_total: AtomicU64::new(0),
            events_triggered_total: AtomicU64::new(0),
            alerts_total: AtomicU64::new(0),
            decision_fallbacks_total: AtomicU64::new(0),
            clusters_total: AtomicU64::new(0),
            outcomes_total: AtomicU64::new(0),
            optimizations_total: AtomicU64::new(0),
            tracker_fallback_frames_total: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_frame(&self, tracks: usize) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.tracks_updated_total.fetch_add(tracks as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_pruned(&self, count: usize) {
        self.pruned_total.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_triggered(&self) {
        self.events_triggered_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert(&self) {
        self.alerts_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decision_fallback(&self) {
        self.decision_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_cluster(&self) {
        self.clusters_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_outcome(&self) {
        self.outcomes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_optimization(&self) {
        self.optimizations_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tracker_fallback_frame(&self) {
        self.tracker_fallback_frames_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn alerts_total(&self) -> u64 {
        self.alerts_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_triggered_total(&self) -> u64 {
        self.events_triggered_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn outcomes_total(&self) -> u64 {
        self.outcomes_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn optimizations_total(&self) -> u64 {
        self.optimizations_total.load(Ordering::Relaxed)
    }

    /// Snapshot all counters, resetting only the per-report frame counter
    pub fn report(&self, active_people: usize, pending_outcomes: usize) -> MetricsSummary {
        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_since_report: self.frames_since_report.swap(0, Ordering::Relaxed),
            tracks_updated_total: self.tracks_updated_total.load(Ordering::Relaxed),
            pruned_total: self.pruned_total.load(Ordering::Relaxed),
            events_triggered_total: self.events_triggered_total.load(Ordering::Relaxed),
            alerts_total: self.alerts_total.load(Ordering::Relaxed),
            decision_fallbacks_total: self.decision_fallbacks_total.load(Ordering::Relaxed),
            clusters_total: self.clusters_total.load(Ordering::Relaxed),
            outcomes_total: self.outcomes_total.load(Ordering::Relaxed),
            optimizations_total: self.optimizations_total.load(Ordering::Relaxed),
            tracker_fallback_frames_total: self
                .tracker_fallback_frames_total
                .load(Ordering::Relaxed),
            active_people,
            pending_outcomes,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_since_report: u64,
    pub tracks_updated_total: u64,
    pub pruned_total: u64,
    pub events_triggered_total: u64,
    pub alerts_total: u64,
    pub decision_fallbacks_total: u64,
    pub clusters_total: u64,
    pub outcomes_total: u64,
    pub optimizations_total: u64,
    pub tracker_fallback_frames_total: u64,
    pub active_people: usize,
    pub pending_outcomes: usize,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_total = %self.frames_total,
            frames_since_report = %self.frames_since_report,
            active_people = %self.active_people,
            pruned = %self.pruned_total,
            events = %self.events_triggered_total,
            alerts = %self.alerts_total,
            decision_fallbacks = %self.decision_fallbacks_total,
            clusters = %self.clusters_total,
            outcomes = %self.outcomes_total,
            pending_outcomes = %self.pending_outcomes,
            optimizations = %self.optimizations_total,
            tracker_fallback_frames = %self.tracker_fallback_frames_total,
            "metrics"
        );
    }
}
