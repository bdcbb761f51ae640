//! Prometheus metrics collection for mdsyncd.
//!
//! Metrics are registered once at startup and exposed on the HTTP endpoint
//! served by [`crate::http`]. Recording helpers are no-ops until [`init`]
//! has run, so the edit path never depends on metrics being enabled.
//!
//! - `mdsync_edits_total{outcome}` - Edit messages by outcome (applied, noop, rejected)
//! - `mdsync_edit_errors_total{code}` - Edit failures by error code
//! - `mdsync_edit_duration_seconds` - Guard wait + apply + fan-out latency
//! - `mdsync_broadcast_fanout` - Recipients per broadcast (histogram)
//! - `mdsync_delivery_failures_total{reason}` - Per-channel delivery failures

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Edit messages processed, labeled by outcome.
pub static EDITS: OnceLock<IntCounterVec> = OnceLock::new();

/// Edit failures, labeled by [`crate::error::EditError::error_code`].
pub static EDIT_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Broadcast deliveries that could not be queued, labeled by reason.
pub static DELIVERY_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

/// Live document sessions in the store.
pub static DOCUMENTS: OnceLock<IntGauge> = OnceLock::new();

/// Currently open client connections.
pub static CONNECTIONS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Recipients per broadcast.
pub static BROADCAST_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Time from dispatch to the end of fan-out for one edit.
pub static EDIT_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(EDITS, IntCounterVec::new(Opts::new("mdsync_edits_total", "Edit messages by outcome"), &["outcome"]));
    register!(EDIT_ERRORS, IntCounterVec::new(Opts::new("mdsync_edit_errors_total", "Edit failures by error code"), &["code"]));
    register!(DELIVERY_FAILURES, IntCounterVec::new(Opts::new("mdsync_delivery_failures_total", "Broadcasts not delivered to a channel"), &["reason"]));
    register!(DOCUMENTS, IntGauge::new("mdsync_documents", "Live document sessions"));
    register!(CONNECTIONS, IntGauge::new("mdsync_connections", "Open client connections"));
    register!(BROADCAST_FANOUT, Histogram::with_opts(
        HistogramOpts::new("mdsync_broadcast_fanout", "Recipients per broadcast")
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0])));
    register!(EDIT_LATENCY, Histogram::with_opts(
        HistogramOpts::new("mdsync_edit_duration_seconds", "Edit latency including guard wait and fan-out")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers
// ============================================================================

/// Outcome of one edit message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Noop,
    Rejected,
}

impl EditOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Noop => "noop",
            Self::Rejected => "rejected",
        }
    }
}

#[inline]
pub fn record_edit(outcome: EditOutcome) {
    if let Some(c) = EDITS.get() {
        c.with_label_values(&[outcome.label()]).inc();
    }
}

#[inline]
pub fn record_edit_error(code: &str) {
    if let Some(c) = EDIT_ERRORS.get() {
        c.with_label_values(&[code]).inc();
    }
}

#[inline]
pub fn record_edit_latency(duration_secs: f64) {
    if let Some(h) = EDIT_LATENCY.get() {
        h.observe(duration_secs);
    }
}

/// Record broadcast fan-out (how many channels took the event).
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = BROADCAST_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[inline]
pub fn record_delivery_failure(reason: &str) {
    if let Some(c) = DELIVERY_FAILURES.get() {
        c.with_label_values(&[reason]).inc();
    }
}

#[inline]
pub fn set_documents(count: usize) {
    if let Some(g) = DOCUMENTS.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn connection_opened() {
    if let Some(g) = CONNECTIONS.get() {
        g.inc();
    }
}

#[inline]
pub fn connection_closed() {
    if let Some(g) = CONNECTIONS.get() {
        g.dec();
    }
}
