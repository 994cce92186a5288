//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by crawl-dispatch and
//! provides functions for initializing, exporting, and persisting them.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

/// Global Prometheus registry for all crawl-dispatch metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Work queue depth observed by the most recent gate evaluation.
pub static QUEUE_DEPTH: OnceLock<Gauge> = OnceLock::new();

/// Gate evaluations, labeled by decision (authorized/blocked).
pub static GATE_DECISIONS: OnceLock<CounterVec> = OnceLock::new();

/// Work items returned by the selector.
pub static ITEMS_SELECTED: OnceLock<Counter> = OnceLock::new();

/// Messages published to the work queue.
pub static MESSAGES_PUBLISHED: OnceLock<Counter> = OnceLock::new();

/// Failed publish attempts.
pub static PUBLISH_FAILURES: OnceLock<Counter> = OnceLock::new();

/// Passes run, labeled by outcome (dispatched/nothing_stale/blocked/error).
pub static PASSES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Pass duration in seconds.
pub static PASS_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Calling it again is harmless: the first set of
/// metrics stays in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let queue_depth = Gauge::new(
        "crawl_dispatch_queue_depth",
        "Work queue depth observed by the gate",
    )?;

    let gate_decisions = CounterVec::new(
        Opts::new("crawl_dispatch_gate_decisions_total", "Gate evaluations by decision"),
        &["decision"],
    )?;

    let items_selected = Counter::new(
        "crawl_dispatch_items_selected_total",
        "Work items returned by the selector",
    )?;

    let messages_published = Counter::new(
        "crawl_dispatch_messages_published_total",
        "Messages published to the work queue",
    )?;

    let publish_failures = Counter::new(
        "crawl_dispatch_publish_failures_total",
        "Failed publish attempts",
    )?;

    let passes_total = CounterVec::new(
        Opts::new("crawl_dispatch_passes_total", "Dispatch passes by outcome"),
        &["outcome"],
    )?;

    let pass_duration = Histogram::with_opts(
        HistogramOpts::new(
            "crawl_dispatch_pass_duration_seconds",
            "Dispatch pass duration in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )?;

    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(gate_decisions.clone()))?;
    registry.register(Box::new(items_selected.clone()))?;
    registry.register(Box::new(messages_published.clone()))?;
    registry.register(Box::new(publish_failures.clone()))?;
    registry.register(Box::new(passes_total.clone()))?;
    registry.register(Box::new(pass_duration.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = GATE_DECISIONS.set(gate_decisions);
    let _ = ITEMS_SELECTED.set(items_selected);
    let _ = MESSAGES_PUBLISHED.set(messages_published);
    let _ = PUBLISH_FAILURES.set(publish_failures);
    let _ = PASSES_TOTAL.set(passes_total);
    let _ = PASS_DURATION.set(pass_duration);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead of metrics if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// Writes the current metrics to `path` for a node-exporter textfile collector.
///
/// The file is written next to `path` first and then renamed over it, so a
/// scraper never reads a half-written file.
pub fn write_textfile(path: &Path) -> std::io::Result<()> {
    let tmp_path = path.with_extension("prom.tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(export_metrics().as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)
}
