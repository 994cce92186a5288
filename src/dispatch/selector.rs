//! Stale work item selection.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::ConfigError;
use crate::error::DispatchError;
use crate::storage::{SelectionOrder, SelectionQuery, WorkItem, WorkItemStore};

/// Chooses which work items a pass dispatches.
///
/// Strictly read-only against the store.
pub struct Selector {
    store: Arc<dyn WorkItemStore>,
    staleness_window: Duration,
    order: SelectionOrder,
}

impl Selector {
    pub fn new(
        store: Arc<dyn WorkItemStore>,
        staleness_window: Duration,
        order: SelectionOrder,
    ) -> Self {
        Self {
            store,
            staleness_window,
            order,
        }
    }

    /// Builds the query for a batch of at most `limit` items.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Config` when `limit` is zero.
    pub fn query(&self, limit: usize) -> Result<SelectionQuery, DispatchError> {
        if limit == 0 {
            return Err(ConfigError::ValidationFailed(
                "selection limit must be greater than 0".to_string(),
            )
            .into());
        }
        Ok(SelectionQuery {
            limit,
            staleness_window: self.staleness_window,
            order: self.order,
        })
    }

    /// Selects up to `limit` active items older than the staleness window.
    ///
    /// An empty result means nothing is stale and is not an error.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Config` for a zero limit (before touching the
    /// store) and `DispatchError::Store` if the query fails.
    pub async fn select_stale_active(&self, limit: usize) -> Result<Vec<WorkItem>, DispatchError> {
        let query = self.query(limit)?;
        let mut items = self.store.select_stale_active(&query).await?;
        // The store contract already bounds the result; keep the batch bounded
        // even against a misbehaving implementation.
        items.truncate(limit);

        debug!(
            selected = items.len(),
            limit,
            order = %self.order,
            window_secs = self.staleness_window.as_secs(),
            "Selected stale work items"
        );
        Ok(items)
    }
}
