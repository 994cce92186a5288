//! Prometheus metrics for dispatch passes.
//!
//! Metrics are recorded through [`MetricsCollector`] and stay disabled until
//! [`init_metrics`] is called. A one-shot pass has nothing to scrape, so the
//! CLI persists the registry with [`write_textfile`] at the end of a run.
//!
//! # Example
//!
//! ```ignore
//! use crawl_dispatch::metrics::{init_metrics, write_textfile, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_pass("dispatched", 0.8);
//!
//! write_textfile(std::path::Path::new("/var/lib/node_exporter/crawl_dispatch.prom"))?;
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics, write_textfile};

pub use prometheus::{
    GATE_DECISIONS, ITEMS_SELECTED, MESSAGES_PUBLISHED, PASSES_TOTAL, PASS_DURATION,
    PUBLISH_FAILURES, QUEUE_DEPTH, REGISTRY,
};
