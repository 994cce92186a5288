//! Publish loop.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::deadline::Deadline;
use crate::error::{DispatchError, PassStage};
use crate::metrics::MetricsCollector;
use crate::queue::WorkQueue;
use crate::storage::WorkItem;

/// Message attribute carrying the work item's group key.
pub const GROUP_KEY_ATTRIBUTE: &str = "domain";

/// What the publish loop does when a single publish fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Abort the pass on the first failure. Earlier publishes stay published.
    #[default]
    FailFast,
    /// Record the failure and keep publishing the rest of the batch.
    Resilient,
}

impl PublishPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishPolicy::FailFast => "fail_fast",
            PublishPolicy::Resilient => "resilient",
        }
    }
}

impl FromStr for PublishPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fail_fast" | "failfast" => Ok(PublishPolicy::FailFast),
            "resilient" => Ok(PublishPolicy::Resilient),
            other => Err(format!(
                "unknown publish policy '{other}' (expected fail_fast or resilient)"
            )),
        }
    }
}

impl std::fmt::Display for PublishPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of publishing one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Published { locator: String, message_id: String },
    Failed { locator: String, reason: String },
}

impl DispatchOutcome {
    pub fn locator(&self) -> &str {
        match self {
            DispatchOutcome::Published { locator, .. } | DispatchOutcome::Failed { locator, .. } => {
                locator
            }
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, DispatchOutcome::Published { .. })
    }
}

/// Totals for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Items handed to the publish loop.
    pub selected: usize,
    /// Publishes started.
    pub attempted: usize,
    /// Publishes that returned a message id.
    pub published: usize,
    /// Publishes recorded as failed (resilient policy only).
    pub failed: usize,
    /// Per-item outcomes in attempt order.
    pub outcomes: Vec<DispatchOutcome>,
}

impl DispatchSummary {
    fn new(selected: usize) -> Self {
        Self {
            selected,
            ..Default::default()
        }
    }
}

/// Builds the attribute map attached to an item's message.
pub fn message_attributes(item: &WorkItem) -> HashMap<String, String> {
    let mut attributes = HashMap::with_capacity(1);
    attributes.insert(
        GROUP_KEY_ATTRIBUTE.to_string(),
        item.group_key().to_string(),
    );
    attributes
}

/// Publishes a batch of work items to the queue, one message per item.
pub struct BatchDispatcher {
    queue: Arc<dyn WorkQueue>,
    policy: PublishPolicy,
    deadline: Option<Deadline>,
    metrics: MetricsCollector,
}

impl BatchDispatcher {
    pub fn new(queue: Arc<dyn WorkQueue>, policy: PublishPolicy) -> Self {
        Self {
            queue,
            policy,
            deadline: None,
            metrics: MetricsCollector::new(),
        }
    }

    /// Bounds every publish by `deadline`.
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn policy(&self) -> PublishPolicy {
        self.policy
    }

    /// Publishes one item: body is the locator, attribute `domain` is the
    /// group key.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Publish` if the transport rejects the message
    /// or returns no message id, and `DispatchError::Timeout` if the deadline
    /// expires while sending.
    pub async fn publish(&self, item: &WorkItem) -> Result<String, DispatchError> {
        let attributes = message_attributes(item);
        let send = async {
            self.queue
                .publish(item.locator(), &attributes)
                .await
                .map_err(|e| DispatchError::Publish {
                    locator: item.locator().to_string(),
                    reason: e.to_string(),
                })
        };

        let message_id = match &self.deadline {
            Some(deadline) => deadline.run(PassStage::Publish, send).await?,
            None => send.await?,
        };

        if message_id.trim().is_empty() {
            return Err(DispatchError::Publish {
                locator: item.locator().to_string(),
                reason: "no message id returned".to_string(),
            });
        }
        Ok(message_id)
    }

    /// Publishes `batch` in order.
    ///
    /// Under [`PublishPolicy::FailFast`] the first failure is returned and the
    /// remaining items are not attempted. Under [`PublishPolicy::Resilient`]
    /// failures are recorded in the summary. A deadline expiry aborts the loop
    /// under either policy.
    pub async fn publish_batch(&self, batch: &[WorkItem]) -> Result<DispatchSummary, DispatchError> {
        let mut summary = DispatchSummary::new(batch.len());

        for item in batch {
            summary.attempted += 1;
            match self.publish(item).await {
                Ok(message_id) => {
                    summary.published += 1;
                    self.metrics.record_published();
                    info!(
                        url = item.locator(),
                        domain = item.group_key(),
                        message_id = %message_id,
                        count = summary.published,
                        "Published work item"
                    );
                    summary.outcomes.push(DispatchOutcome::Published {
                        locator: item.locator().to_string(),
                        message_id,
                    });
                }
                Err(err @ DispatchError::Timeout { .. }) => return Err(err),
                Err(err) => {
                    self.metrics.record_publish_failure();
                    if self.policy == PublishPolicy::FailFast {
                        error!(
                            url = item.locator(),
                            published = summary.published,
                            remaining = batch.len() - summary.attempted,
                            error = %err,
                            "Publish failed, aborting batch"
                        );
                        return Err(err);
                    }

                    warn!(url = item.locator(), error = %err, "Publish failed, continuing");
                    summary.failed += 1;
                    let reason = match err {
                        DispatchError::Publish { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    summary.outcomes.push(DispatchOutcome::Failed {
                        locator: item.locator().to_string(),
                        reason,
                    });
                }
            }
        }

        info!(
            selected = summary.selected,
            published = summary.published,
            failed = summary.failed,
            "Batch dispatch finished"
        );
        Ok(summary)
    }
}
