//! High-level recording interface over the raw Prometheus metrics.

use super::prometheus::{
    GATE_DECISIONS, ITEMS_SELECTED, MESSAGES_PUBLISHED, PASSES_TOTAL, PASS_DURATION,
    PUBLISH_FAILURES, QUEUE_DEPTH,
};

/// Metrics collector for dispatch passes.
///
/// Every method is a no-op until [`init_metrics`](super::init_metrics) has
/// been called, so library code can record unconditionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record the depth seen by a gate evaluation.
    pub fn record_queue_depth(&self, depth: u64) {
        if let Some(gauge) = QUEUE_DEPTH.get() {
            gauge.set(depth as f64);
        }
        tracing::trace!(depth, "Recorded queue depth");
    }

    /// Record a gate decision.
    pub fn record_gate_decision(&self, authorized: bool) {
        let decision = if authorized { "authorized" } else { "blocked" };
        if let Some(counter) = GATE_DECISIONS.get() {
            counter.with_label_values(&[decision]).inc();
        }
        tracing::trace!(decision, "Recorded gate decision");
    }

    /// Record how many items the selector returned.
    pub fn record_selected(&self, count: usize) {
        if let Some(counter) = ITEMS_SELECTED.get() {
            counter.inc_by(count as f64);
        }
    }

    pub fn record_published(&self) {
        if let Some(counter) = MESSAGES_PUBLISHED.get() {
            counter.inc();
        }
    }

    pub fn record_publish_failure(&self) {
        if let Some(counter) = PUBLISH_FAILURES.get() {
            counter.inc();
        }
    }

    /// Record a finished pass.
    ///
    /// # Arguments
    ///
    /// * `outcome` - "dispatched", "nothing_stale", "blocked" or "error"
    /// * `duration_secs` - Wall-clock pass duration in seconds
    pub fn record_pass(&self, outcome: &str, duration_secs: f64) {
        if let Some(counter) = PASSES_TOTAL.get() {
            counter.with_label_values(&[outcome]).inc();
        }
        if let Some(histogram) = PASS_DURATION.get() {
            histogram.observe(duration_secs);
        }
        tracing::trace!(outcome, duration_secs, "Recorded pass metric");
    }
}
