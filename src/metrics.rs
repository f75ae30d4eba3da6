//! Prometheus metrics collection for slirc-services.
//!
//! Exposed on an HTTP endpoint when `services.metrics_port` is set.
//!
//! - `chanserv_acl_changes_total{result}` - access list mutations by outcome
//! - `chanserv_mode_lines_total` - MODE lines flushed by the mode stack
//! - `chanserv_expiries_total{kind}` - timed entries that ran out
//! - `chanserv_akick_enforcements_total` - users banned and kicked by AKICK
//! - `chanserv_acl_events_total{kind}` - committed changes seen by observers
//! - `services_command_total{command}` - bridge commands by type

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Access list mutations, labelled `ok`, `noop` or the error code.
pub static ACL_CHANGES: OnceLock<IntCounterVec> = OnceLock::new();

/// MODE lines handed to the transport.
pub static MODE_LINES: OnceLock<IntCounter> = OnceLock::new();

/// Expiry entries fired, by kind.
pub static EXPIRIES: OnceLock<IntCounterVec> = OnceLock::new();

/// AKICK enforcement events (ban plus kick).
pub static AKICK_ENFORCEMENTS: OnceLock<IntCounter> = OnceLock::new();

/// Committed access changes by kind, fed by the metrics observer.
pub static ACL_EVENTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Bridge commands processed by type.
pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Bridge command latency by type.
pub static COMMAND_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Bridge command errors by type and error kind.
pub static COMMAND_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Registered channels.
pub static REGISTERED_CHANNELS: OnceLock<IntGauge> = OnceLock::new();

/// Access records across all channels.
pub static ACCESS_RECORDS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
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

    register!(ACL_CHANGES, IntCounterVec::new(Opts::new("chanserv_acl_changes_total", "Access list mutations by result"), &["result"]));
    register!(MODE_LINES, IntCounter::new("chanserv_mode_lines_total", "MODE lines flushed"));
    register!(EXPIRIES, IntCounterVec::new(Opts::new("chanserv_expiries_total", "Timed entries expired"), &["kind"]));
    register!(AKICK_ENFORCEMENTS, IntCounter::new("chanserv_akick_enforcements_total", "AKICK enforcement events"));
    register!(ACL_EVENTS, IntCounterVec::new(Opts::new("chanserv_acl_events_total", "Committed access changes by kind"), &["kind"]));

    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("services_command_total", "Bridge commands processed by type"), &["command"]));
    register!(COMMAND_LATENCY, HistogramVec::new(
        HistogramOpts::new("services_command_duration_seconds", "Bridge command latency by type")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["command"]));
    register!(COMMAND_ERRORS, IntCounterVec::new(Opts::new("services_command_errors_total", "Bridge command errors by type"), &["command", "error"]));

    register!(REGISTERED_CHANNELS, IntGauge::new("chanserv_registered_channels", "Registered channels"));
    register!(ACCESS_RECORDS, IntGauge::new("chanserv_access_records", "Access records across all channels"));
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

/// Record the outcome of an access list mutation.
#[inline]
pub fn record_acl_change(result: &str) {
    if let Some(c) = ACL_CHANGES.get() {
        c.with_label_values(&[result]).inc();
    }
}

#[inline]
pub fn record_mode_line() {
    if let Some(c) = MODE_LINES.get() {
        c.inc();
    }
}

#[inline]
pub fn record_expiry(kind: &str) {
    if let Some(c) = EXPIRIES.get() {
        c.with_label_values(&[kind]).inc();
    }
}

#[inline]
pub fn record_acl_event(kind: &str) {
    if let Some(c) = ACL_EVENTS.get() {
        c.with_label_values(&[kind]).inc();
    }
}

#[inline]
pub fn record_akick_enforcement() {
    if let Some(c) = AKICK_ENFORCEMENTS.get() {
        c.inc();
    }
}

/// Record a bridge command execution with latency.
#[inline]
pub fn record_command(command: &str, duration_secs: f64) {
    if let Some(c) = COMMAND_COUNTER.get() {
        c.with_label_values(&[command]).inc();
    }
    if let Some(h) = COMMAND_LATENCY.get() {
        h.with_label_values(&[command]).observe(duration_secs);
    }
}

/// Record a bridge command error.
#[inline]
pub fn record_command_error(command: &str, error: &str) {
    if let Some(c) = COMMAND_ERRORS.get() {
        c.with_label_values(&[command, error]).inc();
    }
}

/// Refresh the size gauges.
#[inline]
pub fn set_sizes(channels: usize, records: usize) {
    if let Some(g) = REGISTERED_CHANNELS.get() {
        g.set(channels as i64);
    }
    if let Some(g) = ACCESS_RECORDS.get() {
        g.set(records as i64);
    }
}
