//! Work queue transport.
//!
//! The dispatcher needs exactly two things from the queue the crawler
//! workers consume:
//!
//! - an approximate depth, used only for the threshold gate
//! - a publish operation that takes a body plus string attributes and
//!   returns a transport-assigned message id
//!
//! # Queue Structure
//!
//! [`RedisWorkQueue`] stores messages in a single Redis list. Producers
//! `LPUSH`, consumers pop from the right, so the list is FIFO. Each entry is a
//! JSON-encoded [`QueueMessage`].

pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::redis::RedisWorkQueue;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to connect to Redis.
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    RedisError(#[from] ::redis::RedisError),

    /// Failed to serialize message data.
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// The write/read interface the dispatch pass uses.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Returns the number of messages currently enqueued.
    ///
    /// Callers must treat this as approximate: consumers run concurrently and
    /// the value can be stale by the time it is compared.
    async fn approximate_depth(&self) -> Result<u64, QueueError>;

    /// Publishes one message and returns its message id.
    async fn publish(
        &self,
        body: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<String, QueueError>;
}

/// A message as stored on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Transport-assigned identifier.
    pub message_id: String,
    /// Message payload; for crawl work this is the page URL.
    pub body: String,
    /// String-valued attributes, e.g. `domain`.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub sent_at: DateTime<Utc>,
}

impl QueueMessage {
    /// Builds a message with a fresh v4 UUID as its id.
    pub fn new(body: impl Into<String>, attributes: HashMap<String, String>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            body: body.into(),
            attributes,
            sent_at: Utc::now(),
        }
    }

    /// Returns an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}
