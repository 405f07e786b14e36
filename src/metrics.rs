//! Prometheus counters for the feed pipeline

use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Feed pipeline metrics
#[derive(Clone)]
pub struct FeedMetrics {
    pub frames_received: IntCounter,
    pub updates_buffered: IntCounter,
    pub updates_superseded: IntCounter,
    pub stale_results: IntCounter,
    pub flushes: IntCounter,
    pub frames_dropped: IntCounter,
    pub reconnects: IntCounter,
    pub visibility_closes: IntCounter,
    pub connected: IntGauge,
}

impl FeedMetrics {
    /// Create the metrics and register them on `registry`
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            frames_received: counter("feed_frames_received_total", "Inbound feed frames")?,
            updates_buffered: counter(
                "feed_updates_buffered_total",
                "Consolidated updates stored in the buffer",
            )?,
            updates_superseded: counter(
                "feed_updates_superseded_total",
                "Buffered updates overwritten before a flush",
            )?,
            stale_results: counter(
                "feed_stale_results_total",
                "Transform results discarded for an old instrument generation",
            )?,
            flushes: counter("feed_flushes_total", "Buffered updates published")?,
            frames_dropped: counter(
                "feed_frames_dropped_total",
                "Outbound frames dropped while not connected",
            )?,
            reconnects: counter("feed_reconnects_total", "Explicit reconnects")?,
            visibility_closes: counter(
                "feed_visibility_closes_total",
                "Connections closed because the book was not observed",
            )?,
            connected: IntGauge::with_opts(Opts::new(
                "feed_connected",
                "1 while the feed connection is in the connected state",
            ))?,
        };

        registry.register(Box::new(metrics.frames_received.clone()))?;
        registry.register(Box::new(metrics.updates_buffered.clone()))?;
        registry.register(Box::new(metrics.updates_superseded.clone()))?;
        registry.register(Box::new(metrics.stale_results.clone()))?;
        registry.register(Box::new(metrics.flushes.clone()))?;
        registry.register(Box::new(metrics.frames_dropped.clone()))?;
        registry.register(Box::new(metrics.reconnects.clone()))?;
        registry.register(Box::new(metrics.visibility_closes.clone()))?;
        registry.register(Box::new(metrics.connected.clone()))?;

        Ok(metrics)
    }
}

fn counter(name: &str, help: &str) -> prometheus::Result<IntCounter> {
    IntCounter::with_opts(Opts::new(name, help))
}
