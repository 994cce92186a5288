//! One dispatch pass: gate, select, publish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::deadline::Deadline;
use super::dispatcher::{BatchDispatcher, DispatchSummary, PublishPolicy};
use super::gate::{GateDecision, QueueDepthGate};
use super::selector::Selector;
use crate::config::DispatcherConfig;
use crate::error::{DispatchError, PassStage};
use crate::metrics::MetricsCollector;
use crate::queue::WorkQueue;
use crate::storage::{SelectionOrder, WorkItemStore};

/// HTTP-style status for a pass that completed.
pub const STATUS_OK: u16 = 200;
/// HTTP-style status for a pass that ended in an error.
pub const STATUS_ERROR: u16 = 500;

/// How a completed pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PassReport {
    /// The queue was above the threshold; nothing was selected or published.
    Blocked { gate: GateDecision },
    /// The gate authorized but no item was stale.
    NothingStale { gate: GateDecision },
    /// The batch went through the publish loop.
    Dispatched {
        gate: GateDecision,
        summary: DispatchSummary,
    },
}

impl PassReport {
    pub fn status(&self) -> &'static str {
        match self {
            PassReport::Blocked { .. } => "blocked",
            PassReport::NothingStale { .. } => "nothing_stale",
            PassReport::Dispatched { .. } => "dispatched",
        }
    }

    pub fn gate(&self) -> &GateDecision {
        match self {
            PassReport::Blocked { gate }
            | PassReport::NothingStale { gate }
            | PassReport::Dispatched { gate, .. } => gate,
        }
    }

    /// Number of messages published by the pass.
    pub fn published(&self) -> usize {
        match self {
            PassReport::Dispatched { summary, .. } => summary.published,
            _ => 0,
        }
    }

    /// Invocation response for this outcome.
    pub fn response(&self) -> InvocationResponse {
        let message = match self {
            PassReport::Blocked { gate } => format!(
                "Queue above threshold, no messages added (depth {} > {})",
                gate.snapshot.depth, gate.threshold
            ),
            PassReport::NothingStale { .. } => "Success, no stale items to dispatch".to_string(),
            PassReport::Dispatched { summary, .. } if summary.failed > 0 => format!(
                "Success, published {} of {} messages ({} failed)",
                summary.published, summary.selected, summary.failed
            ),
            PassReport::Dispatched { summary, .. } => format!(
                "Success, published {} of {} messages",
                summary.published, summary.selected
            ),
        };
        InvocationResponse {
            message,
            status: STATUS_OK,
        }
    }
}

/// Result handed back to whatever triggered the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub message: String,
    pub status: u16,
}

impl InvocationResponse {
    pub fn from_error(err: &DispatchError) -> Self {
        Self {
            message: format!("{}: {}", err.kind(), err),
            status: STATUS_ERROR,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// A single dispatch pass over injected queue and store clients.
///
/// Clients are shared across passes; each `run` re-queries depth and
/// selection from scratch.
pub struct DispatchPass {
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn WorkItemStore>,
    threshold: u64,
    fetch_amount: usize,
    staleness_window: Duration,
    order: SelectionOrder,
    policy: PublishPolicy,
    pass_timeout: Duration,
    metrics: MetricsCollector,
}

impl DispatchPass {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn WorkItemStore>,
        config: &DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            store,
            threshold: config.threshold,
            fetch_amount: config.fetch_amount,
            staleness_window: config.staleness_window,
            order: config.selection_order,
            policy: config.publish_policy,
            pass_timeout: config.pass_timeout,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn gate(&self) -> QueueDepthGate {
        QueueDepthGate::new(Arc::clone(&self.queue), self.threshold)
    }

    pub fn selector(&self) -> Selector {
        Selector::new(Arc::clone(&self.store), self.staleness_window, self.order)
    }

    /// Runs the pass to completion or to the first error.
    ///
    /// Messages published before an error stay published; the error is the
    /// only signal of a partial dispatch.
    pub async fn run(&self) -> Result<PassReport, DispatchError> {
        self.run_within(Deadline::after(self.pass_timeout)).await
    }

    /// Runs the pass under a deadline the caller already started, e.g. one
    /// that also covered connecting the clients.
    pub async fn run_within(&self, deadline: Deadline) -> Result<PassReport, DispatchError> {
        let started = Instant::now();
        let result = self.run_until(&deadline).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(report) => {
                self.metrics
                    .record_pass(report.status(), elapsed.as_secs_f64());
                info!(
                    status = report.status(),
                    published = report.published(),
                    depth = report.gate().snapshot.depth,
                    duration_ms = elapsed.as_millis() as u64,
                    "Dispatch pass complete"
                );
            }
            Err(err) => {
                self.metrics.record_pass("error", elapsed.as_secs_f64());
                error!(
                    kind = err.kind(),
                    error = %err,
                    duration_ms = elapsed.as_millis() as u64,
                    "Dispatch pass failed"
                );
            }
        }
        result
    }

    async fn run_until(&self, deadline: &Deadline) -> Result<PassReport, DispatchError> {
        let gate = self.gate();
        let decision = deadline.run(PassStage::DepthQuery, gate.evaluate()).await?;
        if !decision.authorized {
            return Ok(PassReport::Blocked { gate: decision });
        }

        let selector = self.selector();
        let items = deadline
            .run(
                PassStage::Selection,
                selector.select_stale_active(self.fetch_amount),
            )
            .await?;
        self.metrics.record_selected(items.len());
        if items.is_empty() {
            info!("No stale work items to dispatch");
            return Ok(PassReport::NothingStale { gate: decision });
        }

        let dispatcher =
            BatchDispatcher::new(Arc::clone(&self.queue), self.policy).with_deadline(*deadline);
        let summary = dispatcher.publish_batch(&items).await?;

        Ok(PassReport::Dispatched {
            gate: decision,
            summary,
        })
    }
}
