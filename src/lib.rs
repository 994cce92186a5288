//! crawl-dispatch: queue-depth-gated dispatcher for stale crawler pages.
//!
//! Each pass checks how deep the crawler work queue is and, when it is at or
//! below a threshold, publishes a bounded batch of stale active pages from
//! Postgres to the queue.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod storage;

pub use config::DispatcherConfig;
pub use dispatch::{DispatchPass, InvocationResponse, PassReport};
pub use error::{ConfigError, DispatchError, QueueError, StoreError};
