//! Queue-depth-gated batch dispatch.
//!
//! A pass runs three steps against injected clients:
//!
//! 1. [`QueueDepthGate`] reads the work queue depth and stops the pass when it
//!    is above the threshold.
//! 2. [`Selector`] picks up to `fetch_amount` active pages whose last update is
//!    older than the staleness window.
//! 3. [`BatchDispatcher`] publishes one message per page.
//!
//! [`DispatchPass`] wires the steps together under one deadline.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use crawl_dispatch::config::DispatcherConfig;
//! use crawl_dispatch::dispatch::DispatchPass;
//! use crawl_dispatch::queue::RedisWorkQueue;
//! use crawl_dispatch::storage::PgWorkItemStore;
//!
//! let config = DispatcherConfig::from_env()?;
//! let queue = RedisWorkQueue::connect(&config.queue.redis_url, &config.queue.queue_name).await?;
//! let store = PgWorkItemStore::connect(&config.store).await?;
//!
//! let pass = DispatchPass::new(Arc::new(queue), Arc::new(store), &config);
//! let report = pass.run().await?;
//! println!("{}", report.response().message);
//! ```

mod deadline;
mod dispatcher;
mod gate;
mod pass;
mod selector;

#[cfg(test)]
pub(crate) mod testing;

pub use deadline::Deadline;
pub use dispatcher::{
    message_attributes, BatchDispatcher, DispatchOutcome, DispatchSummary, PublishPolicy,
    GROUP_KEY_ATTRIBUTE,
};
pub use gate::{is_below_threshold, GateDecision, QueueDepthGate, QueueDepthSnapshot};
pub use pass::{DispatchPass, InvocationResponse, PassReport, STATUS_ERROR, STATUS_OK};
pub use selector::Selector;

pub use crate::storage::SelectionOrder;
