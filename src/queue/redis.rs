//! Redis-backed work queue.
//!
//! Messages are JSON [`QueueMessage`] entries in one Redis list named after the
//! queue. Depth is `LLEN`, which Redis answers exactly; the dispatcher still
//! treats it as approximate because workers drain the list concurrently.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::trace;

use super::{QueueError, QueueMessage, WorkQueue};

/// Redis list used as the crawler work queue.
pub struct RedisWorkQueue {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    /// Name of the list.
    queue_name: String,
}

impl RedisWorkQueue {
    /// Connects to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `queue_name` - Name of the list crawler workers consume
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a queue from an existing ConnectionManager.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
        }
    }

    /// Returns up to `limit` messages from the consumer end without removing them.
    pub async fn peek(&self, limit: usize) -> Result<Vec<QueueMessage>, QueueError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.redis.clone();
        let end = -(limit.min(isize::MAX as usize) as isize);
        let data: Vec<String> = conn.lrange(&self.queue_name, end, -1).await?;

        // LRANGE returns head-to-tail; the consumer pops from the tail.
        let mut messages = data
            .iter()
            .map(|s| serde_json::from_str(s))
            .collect::<Result<Vec<QueueMessage>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Returns the queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn approximate_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.redis.clone();
        let len: u64 = conn.llen(&self.queue_name).await?;
        Ok(len)
    }

    async fn publish(
        &self,
        body: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<String, QueueError> {
        let message = QueueMessage::new(body, attributes.clone());
        let serialized = serde_json::to_string(&message)?;

        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;

        trace!(queue = %self.queue_name, message_id = %message.message_id, "Pushed message");
        Ok(message.message_id)
    }
}
