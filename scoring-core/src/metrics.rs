//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the scoring engine.
//! Every collector is registered on a registry owned by the engine, so
//! several engines can live in one process.
//!
//! # Metrics
//!
//! - `scoring_entries_appended_total` - Ledger entries appended
//! - `scoring_rejections_total{kind}` - Submissions rejected, by error kind
//! - `scoring_transitions_total{transition}` - Lifecycle transitions
//! - `scoring_append_duration_seconds` - Histogram of command latencies
//! - `scoring_active_matches` - Match actors currently running

use crate::error::ErrorKind;
use crate::lifecycle::Transition;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Ledger entries appended
    pub entries_appended: IntCounter,

    /// Rejected submissions by kind
    pub rejections: IntCounterVec,

    /// Lifecycle transitions by kind
    pub transitions: IntCounterVec,

    /// Command latency histogram
    pub append_duration: Histogram,

    /// Running match actors
    pub active_matches: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("entries_appended", &self.entries_appended.get())
            .field("active_matches", &self.active_matches.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_appended = IntCounter::new(
            "scoring_entries_appended_total",
            "Ledger entries appended",
        )?;
        registry.register(Box::new(entries_appended.clone()))?;

        let rejections = IntCounterVec::new(
            Opts::new("scoring_rejections_total", "Submissions rejected"),
            &["kind"],
        )?;
        registry.register(Box::new(rejections.clone()))?;

        let transitions = IntCounterVec::new(
            Opts::new("scoring_transitions_total", "Lifecycle transitions"),
            &["transition"],
        )?;
        registry.register(Box::new(transitions.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "scoring_append_duration_seconds",
                "Histogram of command latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        let active_matches =
            IntGauge::new("scoring_active_matches", "Match actors currently running")?;
        registry.register(Box::new(active_matches.clone()))?;

        Ok(Self {
            entries_appended,
            rejections,
            transitions,
            append_duration,
            active_matches,
            registry,
        })
    }

    /// Record appended entries
    pub fn record_entries(&self, count: usize) {
        self.entries_appended.inc_by(count as u64);
    }

    /// Record a rejected submission
    pub fn record_rejection(&self, kind: ErrorKind) {
        self.rejections.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record a lifecycle transition
    pub fn record_transition(&self, transition: &Transition) {
        self.transitions
            .with_label_values(&[transition.label()])
            .inc();
    }

    /// Record command duration
    pub fn record_append_duration(&self, duration_seconds: f64) {
        self.append_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.entries_appended.get(), 0);
        // A second engine in the same process gets its own collectors
        assert!(Metrics::new().is_ok());
    }

    #[test]
    fn test_record_operations() {
        let metrics = Metrics::new().unwrap();

        metrics.record_entries(2);
        assert_eq!(metrics.entries_appended.get(), 2);

        metrics.record_rejection(ErrorKind::Sequence);
        metrics.record_rejection(ErrorKind::Sequence);
        assert_eq!(metrics.rejections.with_label_values(&["sequence"]).get(), 2);

        metrics.record_transition(&Transition::TossOpened);
        assert_eq!(
            metrics.transitions.with_label_values(&["toss_opened"]).get(),
            1
        );

        metrics.record_append_duration(0.002);
        assert_eq!(metrics.append_duration.get_sample_count(), 1);
        assert!(!metrics.registry().gather().is_empty());
    }
}
