//! Error types for a dispatch pass.
//!
//! Each subsystem has its own error enum ([`ConfigError`], [`StoreError`],
//! [`QueueError`]); [`DispatchError`] composes them into the taxonomy a pass
//! reports upward. Nothing in the pass retries: every error ends the pass.

use std::time::Duration;

use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::queue::QueueError;
pub use crate::storage::StoreError;

/// The blocking call that was in flight when the pass deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStage {
    Connect,
    DepthQuery,
    Selection,
    Publish,
}

impl PassStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStage::Connect => "connect",
            PassStage::DepthQuery => "depth query",
            PassStage::Selection => "selection",
            PassStage::Publish => "publish",
        }
    }
}

impl std::fmt::Display for PassStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end a dispatch pass.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed or out-of-range configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The selection query failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The queue depth query failed.
    #[error("Queue transport error: {0}")]
    Transport(#[from] QueueError),

    /// Publishing a work item failed or returned no message id.
    #[error("Failed to publish '{locator}': {reason}")]
    Publish { locator: String, reason: String },

    /// The pass deadline expired during a blocking call.
    #[error("Pass timed out after {after:?} during {stage}")]
    Timeout { stage: PassStage, after: Duration },
}

impl DispatchError {
    /// Name of the error class, for logs and invocation responses.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Config(_) => "ConfigError",
            DispatchError::Store(_) => "StoreError",
            DispatchError::Transport(_) => "TransportError",
            DispatchError::Publish { .. } => "PublishError",
            DispatchError::Timeout { .. } => "TimeoutError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = DispatchError::from(ConfigError::ValidationFailed("x".to_string()));
        assert_eq!(err.kind(), "ConfigError");

        let err = DispatchError::from(StoreError::InvalidRow("x".to_string()));
        assert_eq!(err.kind(), "StoreError");

        let err = DispatchError::from(QueueError::ConnectionFailed("x".to_string()));
        assert_eq!(err.kind(), "TransportError");

        let err = DispatchError::Publish {
            locator: "https://example.com".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.kind(), "PublishError");

        let err = DispatchError::Timeout {
            stage: PassStage::Selection,
            after: Duration::from_secs(1),
        };
        assert_eq!(err.kind(), "TimeoutError");
    }

    #[test]
    fn test_error_display() {
        let err = DispatchError::Publish {
            locator: "https://example.com/a".to_string(),
            reason: "no message id returned".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("https://example.com/a"));
        assert!(msg.contains("no message id"));

        let err = DispatchError::Timeout {
            stage: PassStage::DepthQuery,
            after: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("depth query"));
        assert!(err.to_string().contains("30"));

        let err = DispatchError::Timeout {
            stage: PassStage::Connect,
            after: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("during connect"));
    }
}
