//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Event queue dispatch
//! - Site and glidein state transitions
//! - Batch job submission and log watching

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Event Queue
// =============================================================================

/// Events handled by a worker, by entity kind and event code.
pub static EVENTS_DISPATCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("corral_events_dispatched_total", "Total events dispatched"),
        &["kind", "code"],
    )
    .unwrap()
});

/// Events that arrived in a state where they have no effect.
pub static EVENTS_IGNORED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "corral_events_ignored_total",
            "Events ignored because of the current state",
        ),
        &["kind", "code"],
    )
    .unwrap()
});

/// Time spent handling one event.
pub static EVENT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "corral_event_duration_seconds",
            "Duration of event handling",
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// State Machines
// =============================================================================

/// State transitions by entity kind and target state.
pub static STATE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "corral_state_transitions_total",
            "Total state transitions",
        ),
        &["kind", "state"],
    )
    .unwrap()
});

/// Entities whose recovery ended in FAILED.
pub static RECOVERY_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "corral_recovery_failures_total",
            "Entities failed during startup recovery",
        ),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Batch Jobs
// =============================================================================

/// Submit attempts by result.
pub static JOBS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("corral_jobs_submitted_total", "Total batch job submissions"),
        &["result"], // "success", "failure"
    )
    .unwrap()
});

/// Cancel attempts by result.
pub static JOBS_CANCELLED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("corral_jobs_cancelled_total", "Total batch job cancels"),
        &["result"],
    )
    .unwrap()
});

/// Job logs currently being watched.
pub static ACTIVE_GENERATORS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "corral_job_watchers_active",
        "Number of job logs currently being tailed",
    )
    .unwrap()
});

/// History entries dropped because the writer fell behind or stopped.
pub static HISTORY_DROPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "corral_history_dropped_total",
        "State history entries dropped before reaching the store",
    )
    .unwrap()
});

/// All core metrics, for registration in a server registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Event queue
        Box::new(EVENTS_DISPATCHED.clone()),
        Box::new(EVENTS_IGNORED.clone()),
        Box::new(EVENT_DURATION.clone()),
        // State machines
        Box::new(STATE_TRANSITIONS.clone()),
        Box::new(RECOVERY_FAILURES.clone()),
        // Batch jobs
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOBS_CANCELLED.clone()),
        Box::new(ACTIVE_GENERATORS.clone()),
        // History
        Box::new(HISTORY_DROPPED.clone()),
    ]
}
