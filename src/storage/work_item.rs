//! Work items and the read interface the dispatcher needs from the page store.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::database::StoreError;

/// One unit of crawl work: a page URL plus the domain it belongs to.
///
/// Work items are read-only from the dispatcher's point of view; the crawler
/// pipeline creates them and advances their `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    locator: String,
    group_key: String,
}

impl WorkItem {
    /// Creates a work item.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidRow` if `locator` is empty.
    pub fn new(
        locator: impl Into<String>,
        group_key: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let locator = locator.into();
        if locator.trim().is_empty() {
            return Err(StoreError::InvalidRow("empty locator".to_string()));
        }
        Ok(Self {
            locator,
            group_key: group_key.into(),
        })
    }

    /// The page URL; published verbatim as the message body.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// The page's domain; carried as the `domain` message attribute.
    pub fn group_key(&self) -> &str {
        &self.group_key
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.locator, self.group_key)
    }
}

/// Tie-break used when more items are stale than fit in one batch.
///
/// `Random` spreads dispatch evenly over items that became stale together.
/// `OldestFirst` walks the backlog monotonically by `updated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrder {
    #[default]
    Random,
    OldestFirst,
}

impl SelectionOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionOrder::Random => "random",
            SelectionOrder::OldestFirst => "oldest_first",
        }
    }

    /// The SQL `ORDER BY` expression for this order.
    pub fn order_by_clause(&self) -> &'static str {
        match self {
            SelectionOrder::Random => "RANDOM()",
            SelectionOrder::OldestFirst => "updated_at ASC, url ASC",
        }
    }
}

impl FromStr for SelectionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "random" => Ok(SelectionOrder::Random),
            "oldest_first" | "oldest" => Ok(SelectionOrder::OldestFirst),
            other => Err(format!("unknown selection order '{}'", other)),
        }
    }
}

impl fmt::Display for SelectionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one stale-item selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionQuery {
    /// Maximum number of rows to return. Always greater than zero.
    pub limit: usize,
    /// Items updated more recently than this are not eligible.
    pub staleness_window: Duration,
    pub order: SelectionOrder,
}

impl SelectionQuery {
    /// Builds the parameterized SQL.
    ///
    /// Bind order: `$1` active flag, `$2` window in seconds, `$3` limit.
    pub fn sql(&self) -> String {
        format!(
            r#"
            SELECT url, domain
            FROM pages
            WHERE is_active = $1
              AND updated_at < NOW() - make_interval(secs => $2)
            ORDER BY {}
            LIMIT $3
            "#,
            self.order.order_by_clause()
        )
    }

    /// The staleness window as fractional seconds, the unit `make_interval` takes.
    pub fn window_secs(&self) -> f64 {
        self.staleness_window.as_secs_f64()
    }
}

/// Read interface over the page store.
///
/// Implementations must only return items that are active and whose last
/// update is older than the query's staleness window, and never more than
/// `query.limit` of them. An empty result is not an error.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// Selects stale, active work items.
    async fn select_stale_active(
        &self,
        query: &SelectionQuery,
    ) -> Result<Vec<WorkItem>, StoreError>;

    /// Releases connections held by the store.
    async fn close(&self) {}
}
