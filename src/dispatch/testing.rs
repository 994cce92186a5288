//! In-memory queue and store used by the dispatch unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::queue::{QueueError, QueueMessage, WorkQueue};
use crate::storage::{SelectionOrder, SelectionQuery, StoreError, WorkItem, WorkItemStore};

pub(crate) fn work_items(count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|i| {
            WorkItem::new(format!("https://site{}.com/page/{i}", i % 3), format!("site{}.com", i % 3))
                .expect("valid item")
        })
        .collect()
}

pub(crate) struct MockQueue {
    depth: AtomicU64,
    fail_depth: bool,
    fail_publish_at: HashSet<usize>,
    empty_ids: bool,
    depth_delay: Option<Duration>,
    publish_delay: Option<Duration>,
    depth_calls: AtomicUsize,
    publish_calls: AtomicUsize,
    published: Mutex<Vec<QueueMessage>>,
}

impl MockQueue {
    pub(crate) fn with_depth(depth: u64) -> Self {
        Self {
            depth: AtomicU64::new(depth),
            fail_depth: false,
            fail_publish_at: HashSet::new(),
            empty_ids: false,
            depth_delay: None,
            publish_delay: None,
            depth_calls: AtomicUsize::new(0),
            publish_calls: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_depth() -> Self {
        Self {
            fail_depth: true,
            ..Self::with_depth(0)
        }
    }

    /// Fails the publish calls at the given zero-based call indices.
    pub(crate) fn failing_publish_at(mut self, indices: &[usize]) -> Self {
        self.fail_publish_at = indices.iter().copied().collect();
        self
    }

    pub(crate) fn returning_empty_ids(mut self) -> Self {
        self.empty_ids = true;
        self
    }

    pub(crate) fn with_depth_delay(mut self, delay: Duration) -> Self {
        self.depth_delay = Some(delay);
        self
    }

    pub(crate) fn with_publish_delay(mut self, delay: Duration) -> Self {
        self.publish_delay = Some(delay);
        self
    }

    pub(crate) fn set_depth(&self, depth: u64) {
        self.depth.store(depth, Ordering::SeqCst);
    }

    pub(crate) fn depth_calls(&self) -> usize {
        self.depth_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn published(&self) -> Vec<QueueMessage> {
        self.published.lock().expect("lock").clone()
    }
}

#[async_trait]
impl WorkQueue for MockQueue {
    async fn approximate_depth(&self) -> Result<u64, QueueError> {
        self.depth_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.depth_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_depth {
            return Err(QueueError::ConnectionFailed("connection refused".to_string()));
        }
        Ok(self.depth.load(Ordering::SeqCst))
    }

    async fn publish(
        &self,
        body: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<String, QueueError> {
        let call = self.publish_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.publish_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_publish_at.contains(&call) {
            return Err(QueueError::ConnectionFailed("send rejected".to_string()));
        }

        let message = QueueMessage::new(body, attributes.clone());
        let id = if self.empty_ids {
            String::new()
        } else {
            message.message_id.clone()
        };
        self.published.lock().expect("lock").push(message);
        Ok(id)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockPage {
    url: String,
    domain: String,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl MockPage {
    pub(crate) fn new(url: &str, domain: &str, is_active: bool, updated_at: DateTime<Utc>) -> Self {
        Self {
            url: url.to_string(),
            domain: domain.to_string(),
            is_active,
            updated_at,
        }
    }
}

/// Applies the same filter and ordering as the Postgres query. `Random`
/// keeps insertion order.
pub(crate) struct MockStore {
    pages: Vec<MockPage>,
    fail: bool,
    ignore_limit: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_query: Mutex<Option<SelectionQuery>>,
}

impl MockStore {
    pub(crate) fn new(pages: Vec<MockPage>) -> Self {
        Self {
            pages,
            fail: false,
            ignore_limit: false,
            delay: None,
            calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        }
    }

    /// `count` active pages last crawled two days ago.
    pub(crate) fn with_stale_pages(count: usize) -> Self {
        let updated_at = Utc::now() - chrono::Duration::hours(48);
        let pages = work_items(count)
            .iter()
            .map(|item| MockPage::new(item.locator(), item.group_key(), true, updated_at))
            .collect();
        Self::new(pages)
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn ignoring_limit(mut self) -> Self {
        self.ignore_limit = true;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_query(&self) -> Option<SelectionQuery> {
        self.last_query.lock().expect("lock").clone()
    }
}

#[async_trait]
impl WorkItemStore for MockStore {
    async fn select_stale_active(&self, query: &SelectionQuery) -> Result<Vec<WorkItem>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().expect("lock") = Some(query.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(StoreError::ConnectionFailed("connection reset".to_string()));
        }

        let window = chrono::Duration::from_std(query.staleness_window).expect("window in range");
        let cutoff = Utc::now() - window;
        let mut pages: Vec<&MockPage> = self
            .pages
            .iter()
            .filter(|p| p.is_active && p.updated_at < cutoff)
            .collect();
        if query.order == SelectionOrder::OldestFirst {
            pages.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.url.cmp(&b.url)));
        }
        if !self.ignore_limit {
            pages.truncate(query.limit);
        }

        pages
            .into_iter()
            .map(|p| WorkItem::new(p.url.as_str(), p.domain.as_str()))
            .collect()
    }
}
