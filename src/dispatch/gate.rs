//! Queue depth gate.
//!
//! Decides whether a pass may publish at all. The depth comes from the queue
//! transport and is approximate; the gate takes it at face value and accepts
//! slight over- or under-dispatch rather than coordinating with consumers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::metrics::MetricsCollector;
use crate::queue::WorkQueue;

/// Point-in-time queue depth. Fetched once per pass and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueDepthSnapshot {
    pub depth: u64,
    pub observed_at: DateTime<Utc>,
}

/// Result of one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub snapshot: QueueDepthSnapshot,
    pub threshold: u64,
    /// True when `snapshot.depth <= threshold`.
    pub authorized: bool,
}

/// `true` iff a queue holding `depth` messages may receive more work.
pub fn is_below_threshold(depth: u64, threshold: u64) -> bool {
    depth <= threshold
}

/// Threshold check against the work queue's current depth.
pub struct QueueDepthGate {
    queue: Arc<dyn WorkQueue>,
    threshold: u64,
    metrics: MetricsCollector,
}

impl QueueDepthGate {
    /// Creates a gate over `queue` with an already-validated threshold.
    pub fn new(queue: Arc<dyn WorkQueue>, threshold: u64) -> Self {
        Self {
            queue,
            threshold,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Queries the depth and compares it to the threshold.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Transport` if the depth query fails.
    pub async fn evaluate(&self) -> Result<GateDecision, DispatchError> {
        let depth = self.queue.approximate_depth().await?;
        let snapshot = QueueDepthSnapshot {
            depth,
            observed_at: Utc::now(),
        };
        let authorized = is_below_threshold(depth, self.threshold);

        self.metrics.record_queue_depth(depth);
        self.metrics.record_gate_decision(authorized);

        if authorized {
            debug!(depth, threshold = self.threshold, "Queue at or below threshold");
        } else {
            info!(
                depth,
                threshold = self.threshold,
                "Queue above threshold, skipping dispatch"
            );
        }

        Ok(GateDecision {
            snapshot,
            threshold: self.threshold,
            authorized,
        })
    }

    /// Returns `true` iff the current depth is at or below the threshold.
    pub async fn check_below_threshold(&self) -> Result<bool, DispatchError> {
        Ok(self.evaluate().await?.authorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::testing::MockQueue;

    #[test]
    fn test_threshold_comparison_is_inclusive() {
        for threshold in 0..20u64 {
            for depth in 0..40u64 {
                assert_eq!(
                    is_below_threshold(depth, threshold),
                    depth <= threshold,
                    "depth={depth} threshold={threshold}"
                );
            }
        }
        assert!(is_below_threshold(u64::MAX, u64::MAX));
        assert!(!is_below_threshold(1, 0));
    }

    #[tokio::test]
    async fn test_gate_authorizes_at_or_below_threshold() {
        let queue = Arc::new(MockQueue::with_depth(5));
        let gate = QueueDepthGate::new(queue.clone(), 10);
        assert!(gate.check_below_threshold().await.expect("depth query"));

        let gate = QueueDepthGate::new(Arc::new(MockQueue::with_depth(10)), 10);
        assert!(gate.check_below_threshold().await.expect("depth query"));
    }

    #[tokio::test]
    async fn test_gate_blocks_above_threshold() {
        let gate = QueueDepthGate::new(Arc::new(MockQueue::with_depth(50)), 10);
        let decision = gate.evaluate().await.expect("depth query");
        assert!(!decision.authorized);
        assert_eq!(decision.snapshot.depth, 50);
        assert_eq!(decision.threshold, 10);
    }

    #[tokio::test]
    async fn test_default_threshold_only_allows_empty_queue() {
        let gate = QueueDepthGate::new(Arc::new(MockQueue::with_depth(0)), 0);
        assert!(gate.check_below_threshold().await.expect("depth query"));

        let gate = QueueDepthGate::new(Arc::new(MockQueue::with_depth(1)), 0);
        assert!(!gate.check_below_threshold().await.expect("depth query"));
    }

    #[tokio::test]
    async fn test_gate_is_idempotent_without_publishes() {
        let queue = Arc::new(MockQueue::with_depth(3));
        let gate = QueueDepthGate::new(queue.clone(), 3);
        let first = gate.check_below_threshold().await.expect("depth query");
        let second = gate.check_below_threshold().await.expect("depth query");
        assert_eq!(first, second);
        assert_eq!(queue.depth_calls(), 2);
        assert!(queue.published().is_empty());
    }

    #[tokio::test]
    async fn test_depth_query_failure_is_transport_error() {
        let gate = QueueDepthGate::new(Arc::new(MockQueue::failing_depth()), 10);
        let err = gate.check_below_threshold().await.unwrap_err();
        assert_eq!(err.kind(), "TransportError");
    }
}
