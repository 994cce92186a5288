//! Dispatcher configuration.
//!
//! All options are assembled once at startup into a [`DispatcherConfig`],
//! validated eagerly, and then passed by reference into the dispatch pass.
//! Every option is optional and has a documented default; a value that is
//! present but malformed is a fatal [`ConfigError`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::{PublishPolicy, SelectionOrder};

/// Default number of work items selected per pass.
pub const DEFAULT_FETCH_AMOUNT: usize = 10;

/// Default queue depth threshold (dispatch only into an empty queue).
pub const DEFAULT_THRESHOLD: u64 = 0;

/// Default staleness window in hours.
pub const DEFAULT_STALENESS_WINDOW_HOURS: u64 = 24;

/// Default deadline for a whole dispatch pass, in seconds.
pub const DEFAULT_PASS_TIMEOUT_SECS: u64 = 60;

/// Largest accepted staleness window (ten years), well inside a Postgres
/// interval and `chrono::Duration`.
pub const MAX_STALENESS_WINDOW_HOURS: u64 = 10 * 366 * 24;

/// Largest accepted pass deadline (one day).
pub const MAX_PASS_TIMEOUT_SECS: u64 = 24 * 3600;

/// Errors that can occur while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is present but could not be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// TLS mode for the store connection, using libpq's names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    #[default]
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(format!("unknown ssl mode '{}'", other)),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for the PostgreSQL page store.
#[derive(Clone)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub ssl_mode: SslMode,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "crawler".to_string(),
            password: None,
            database: "crawler".to_string(),
            ssl_mode: SslMode::default(),
            max_connections: 10,
        }
    }
}

// Hand-written so the password never reaches logs.
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Settings for the work queue transport.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// Name of the list the crawler workers consume.
    pub queue_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            queue_name: "crawler:pages".to_string(),
        }
    }
}

/// Complete configuration for one dispatcher process.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub store: StoreConfig,
    pub queue: QueueConfig,

    // Gate
    /// Dispatch only when the queue holds at most this many messages.
    pub threshold: u64,

    // Selection
    /// Maximum number of items selected per pass.
    pub fetch_amount: usize,
    /// Minimum age since last update before an item is eligible.
    pub staleness_window: Duration,
    pub selection_order: SelectionOrder,

    // Publishing
    pub publish_policy: PublishPolicy,
    /// Deadline for the whole pass.
    pub pass_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            queue: QueueConfig::default(),
            threshold: DEFAULT_THRESHOLD,
            fetch_amount: DEFAULT_FETCH_AMOUNT,
            staleness_window: Duration::from_secs(DEFAULT_STALENESS_WINDOW_HOURS * 3600),
            selection_order: SelectionOrder::default(),
            publish_policy: PublishPolicy::default(),
            pass_timeout: Duration::from_secs(DEFAULT_PASS_TIMEOUT_SECS),
        }
    }
}

impl DispatcherConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PG_HOST`: store host (default: localhost)
    /// - `PG_PORT`: store port (default: 5432)
    /// - `PG_USER`: store user (default: crawler)
    /// - `PG_PASSWORD`: store password (default: none)
    /// - `PG_DATABASE`: database name (default: crawler)
    /// - `PG_SSL_MODE`: disable, allow, prefer, require, verify-ca, verify-full (default: require)
    /// - `PG_MAX_CONNECTIONS`: pool size (default: 10)
    /// - `QUEUE_REDIS_URL`: queue transport URL (default: redis://localhost:6379)
    /// - `QUEUE_NAME`: queue destination (default: crawler:pages)
    /// - `QUEUE_THRESHOLD`: gate threshold, non-negative (default: 0)
    /// - `FETCH_AMOUNT`: batch size limit, positive (default: 10)
    /// - `STALENESS_WINDOW_HOURS`: staleness window, positive (default: 24)
    /// - `SELECTION_ORDER`: random or oldest_first (default: random)
    /// - `PUBLISH_POLICY`: fail_fast or resilient (default: fail_fast)
    /// - `PASS_TIMEOUT_SECS`: pass deadline, positive (default: 60)
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is malformed or fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup.
    ///
    /// [`from_env`](Self::from_env) is this function over the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        // Store settings
        if let Some(val) = get("PG_HOST") {
            config.store.host = val;
        }

        if let Some(val) = get("PG_PORT") {
            config.store.port = parse_env_value(&val, "PG_PORT")?;
        }

        if let Some(val) = get("PG_USER") {
            config.store.user = val;
        }

        if let Some(val) = get("PG_PASSWORD") {
            config.store.password = Some(val);
        }

        if let Some(val) = get("PG_DATABASE") {
            config.store.database = val;
        }

        if let Some(val) = get("PG_SSL_MODE") {
            config.store.ssl_mode = parse_env_value(&val, "PG_SSL_MODE")?;
        }

        if let Some(val) = get("PG_MAX_CONNECTIONS") {
            config.store.max_connections = parse_env_value(&val, "PG_MAX_CONNECTIONS")?;
        }

        // Queue settings
        if let Some(val) = get("QUEUE_REDIS_URL") {
            config.queue.redis_url = val;
        }

        if let Some(val) = get("QUEUE_NAME") {
            config.queue.queue_name = val;
        }

        if let Some(val) = get("QUEUE_THRESHOLD") {
            config.threshold = parse_env_value(&val, "QUEUE_THRESHOLD")?;
        }

        // Selection settings
        if let Some(val) = get("FETCH_AMOUNT") {
            config.fetch_amount = parse_env_value(&val, "FETCH_AMOUNT")?;
        }

        if let Some(val) = get("STALENESS_WINDOW_HOURS") {
            let hours: u64 = parse_env_value(&val, "STALENESS_WINDOW_HOURS")?;
            let secs = hours
                .checked_mul(3600)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "STALENESS_WINDOW_HOURS".to_string(),
                    message: format!("{} hours overflows", hours),
                })?;
            config.staleness_window = Duration::from_secs(secs);
        }

        if let Some(val) = get("SELECTION_ORDER") {
            config.selection_order = parse_env_value(&val, "SELECTION_ORDER")?;
        }

        // Publishing settings
        if let Some(val) = get("PUBLISH_POLICY") {
            config.publish_policy = parse_env_value(&val, "PUBLISH_POLICY")?;
        }

        if let Some(val) = get("PASS_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "PASS_TIMEOUT_SECS")?;
            config.pass_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.host.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "store host cannot be empty".to_string(),
            ));
        }

        if self.store.port == 0 {
            return Err(ConfigError::ValidationFailed(
                "store port must be greater than 0".to_string(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.queue.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue redis_url cannot be empty".to_string(),
            ));
        }

        if self.queue.queue_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_name cannot be empty".to_string(),
            ));
        }

        if self.fetch_amount == 0 {
            return Err(ConfigError::ValidationFailed(
                "fetch_amount must be greater than 0".to_string(),
            ));
        }

        if self.staleness_window.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "staleness_window must be greater than 0".to_string(),
            ));
        }

        if self.staleness_window > Duration::from_secs(MAX_STALENESS_WINDOW_HOURS * 3600) {
            return Err(ConfigError::InvalidValue {
                key: "STALENESS_WINDOW_HOURS".to_string(),
                message: format!("must be at most {} hours", MAX_STALENESS_WINDOW_HOURS),
            });
        }

        if self.pass_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "pass_timeout must be greater than 0".to_string(),
            ));
        }

        if self.pass_timeout > Duration::from_secs(MAX_PASS_TIMEOUT_SECS) {
            return Err(ConfigError::InvalidValue {
                key: "PASS_TIMEOUT_SECS".to_string(),
                message: format!("must be at most {} seconds", MAX_PASS_TIMEOUT_SECS),
            });
        }

        Ok(())
    }

    /// Builder method to set the queue depth threshold.
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Builder method to set the batch size limit.
    pub fn with_fetch_amount(mut self, amount: usize) -> Self {
        self.fetch_amount = amount;
        self
    }

    /// Builder method to set the staleness window.
    pub fn with_staleness_window(mut self, window: Duration) -> Self {
        self.staleness_window = window;
        self
    }

    /// Builder method to set the selection order.
    pub fn with_selection_order(mut self, order: SelectionOrder) -> Self {
        self.selection_order = order;
        self
    }

    /// Builder method to set the publish policy.
    pub fn with_publish_policy(mut self, policy: PublishPolicy) -> Self {
        self.publish_policy = policy;
        self
    }

    /// Builder method to set the pass deadline.
    pub fn with_pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = timeout;
        self
    }

    /// Builder method to set the queue name.
    pub fn with_queue_name(mut self, name: impl Into<String>) -> Self {
        self.queue.queue_name = name.into();
        self
    }

    /// Builder method to set the Redis URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.queue.redis_url = url.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.threshold, 0);
        assert_eq!(config.fetch_amount, 10);
        assert_eq!(config.staleness_window, Duration::from_secs(24 * 3600));
        assert_eq!(config.selection_order, SelectionOrder::Random);
        assert_eq!(config.publish_policy, PublishPolicy::FailFast);
        assert_eq!(config.pass_timeout, Duration::from_secs(60));
        assert_eq!(config.store.port, 5432);
        assert_eq!(config.store.ssl_mode, SslMode::Require);
        assert!(config.store.password.is_none());
        assert_eq!(config.queue.queue_name, "crawler:pages");
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = DispatcherConfig::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config.fetch_amount, DEFAULT_FETCH_AMOUNT);
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_from_lookup_reads_all_keys() {
        let config = DispatcherConfig::from_lookup(lookup_from(&[
            ("PG_HOST", "db.internal"),
            ("PG_PORT", "6432"),
            ("PG_USER", "dispatcher"),
            ("PG_PASSWORD", "s3cret"),
            ("PG_DATABASE", "pages"),
            ("PG_SSL_MODE", "disable"),
            ("PG_MAX_CONNECTIONS", "4"),
            ("QUEUE_REDIS_URL", "redis://queue:6379"),
            ("QUEUE_NAME", "crawl"),
            ("QUEUE_THRESHOLD", "25"),
            ("FETCH_AMOUNT", "50"),
            ("STALENESS_WINDOW_HOURS", "6"),
            ("SELECTION_ORDER", "oldest_first"),
            ("PUBLISH_POLICY", "resilient"),
            ("PASS_TIMEOUT_SECS", "30"),
        ]))
        .expect("config should parse");

        assert_eq!(config.store.host, "db.internal");
        assert_eq!(config.store.port, 6432);
        assert_eq!(config.store.user, "dispatcher");
        assert_eq!(config.store.password.as_deref(), Some("s3cret"));
        assert_eq!(config.store.database, "pages");
        assert_eq!(config.store.ssl_mode, SslMode::Disable);
        assert_eq!(config.store.max_connections, 4);
        assert_eq!(config.queue.redis_url, "redis://queue:6379");
        assert_eq!(config.queue.queue_name, "crawl");
        assert_eq!(config.threshold, 25);
        assert_eq!(config.fetch_amount, 50);
        assert_eq!(config.staleness_window, Duration::from_secs(6 * 3600));
        assert_eq!(config.selection_order, SelectionOrder::OldestFirst);
        assert_eq!(config.publish_policy, PublishPolicy::Resilient);
        assert_eq!(config.pass_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = DispatcherConfig::from_lookup(lookup_from(&[
            ("QUEUE_THRESHOLD", ""),
            ("FETCH_AMOUNT", "  "),
        ]))
        .expect("blank values fall back to defaults");
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.fetch_amount, DEFAULT_FETCH_AMOUNT);
    }

    #[test]
    fn test_non_numeric_threshold_is_rejected() {
        let err = DispatcherConfig::from_lookup(lookup_from(&[("QUEUE_THRESHOLD", "ten")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "QUEUE_THRESHOLD"));
        assert!(err.to_string().contains("ten"));
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let err = DispatcherConfig::from_lookup(lookup_from(&[("QUEUE_THRESHOLD", "-1")]))
            .unwrap_err();
        assert!(err.to_string().contains("QUEUE_THRESHOLD"));
    }

    #[test]
    fn test_zero_fetch_amount_is_rejected() {
        let err =
            DispatcherConfig::from_lookup(lookup_from(&[("FETCH_AMOUNT", "0")])).unwrap_err();
        assert!(err.to_string().contains("fetch_amount"));
    }

    #[test]
    fn test_unknown_enum_values_are_rejected() {
        let err = DispatcherConfig::from_lookup(lookup_from(&[("SELECTION_ORDER", "newest")]))
            .unwrap_err();
        assert!(err.to_string().contains("SELECTION_ORDER"));

        let err = DispatcherConfig::from_lookup(lookup_from(&[("PUBLISH_POLICY", "retry")]))
            .unwrap_err();
        assert!(err.to_string().contains("PUBLISH_POLICY"));

        let err =
            DispatcherConfig::from_lookup(lookup_from(&[("PG_SSL_MODE", "sometimes")])).unwrap_err();
        assert!(err.to_string().contains("PG_SSL_MODE"));
    }

    #[test]
    fn test_config_builder() {
        let config = DispatcherConfig::new()
            .with_threshold(7)
            .with_fetch_amount(3)
            .with_staleness_window(Duration::from_secs(60))
            .with_selection_order(SelectionOrder::OldestFirst)
            .with_publish_policy(PublishPolicy::Resilient)
            .with_pass_timeout(Duration::from_secs(5))
            .with_queue_name("q")
            .with_redis_url("redis://example:6379");

        assert_eq!(config.threshold, 7);
        assert_eq!(config.fetch_amount, 3);
        assert_eq!(config.staleness_window, Duration::from_secs(60));
        assert_eq!(config.selection_order, SelectionOrder::OldestFirst);
        assert_eq!(config.publish_policy, PublishPolicy::Resilient);
        assert_eq!(config.pass_timeout, Duration::from_secs(5));
        assert_eq!(config.queue.queue_name, "q");
        assert_eq!(config.queue.redis_url, "redis://example:6379");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = DispatcherConfig::default().with_pass_timeout(Duration::ZERO);
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("pass_timeout"));
    }

    #[test]
    fn test_overflowing_staleness_window_rejected() {
        let lookup = lookup_from(&[("STALENESS_WINDOW_HOURS", "18446744073709551615")]);
        let err = DispatcherConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "STALENESS_WINDOW_HOURS"
        ));
    }

    #[test]
    fn test_staleness_window_upper_bound() {
        let at_limit = MAX_STALENESS_WINDOW_HOURS.to_string();
        let config = DispatcherConfig::from_lookup(lookup_from(&[(
            "STALENESS_WINDOW_HOURS",
            at_limit.as_str(),
        )]))
        .expect("window at the limit is accepted");
        assert!(chrono::Duration::from_std(config.staleness_window).is_ok());

        let over = (MAX_STALENESS_WINDOW_HOURS + 1).to_string();
        let err = DispatcherConfig::from_lookup(lookup_from(&[(
            "STALENESS_WINDOW_HOURS",
            over.as_str(),
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "STALENESS_WINDOW_HOURS"
        ));
    }

    #[test]
    fn test_pass_timeout_upper_bound() {
        let err = DispatcherConfig::from_lookup(lookup_from(&[(
            "PASS_TIMEOUT_SECS",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "PASS_TIMEOUT_SECS"
        ));

        let config = DispatcherConfig::default()
            .with_pass_timeout(Duration::from_secs(MAX_PASS_TIMEOUT_SECS));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_queue_name() {
        let config = DispatcherConfig::default().with_queue_name("");
        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("queue_name"));
    }

    #[test]
    fn test_ssl_mode_roundtrip_names() {
        for mode in [
            SslMode::Disable,
            SslMode::Allow,
            SslMode::Prefer,
            SslMode::Require,
            SslMode::VerifyCa,
            SslMode::VerifyFull,
        ] {
            assert_eq!(mode.as_str().parse::<SslMode>(), Ok(mode));
        }
    }

    #[test]
    fn test_store_debug_redacts_password() {
        let store = StoreConfig {
            password: Some("hunter2".to_string()),
            ..StoreConfig::default()
        };
        let rendered = format!("{:?}", store);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
