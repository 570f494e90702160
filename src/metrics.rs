//! Prometheus metrics for huddled.
//!
//! Tracks command throughput and latency, live session/participant counts,
//! fan-out behavior, and teardown reasons. Exposed on an HTTP endpoint for
//! scraping; disabled entirely when `metrics_port = 0`.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
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

/// Commands processed by type.
pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Command errors by type and error code.
pub static COMMAND_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Sessions ended, by reason.
pub static SESSIONS_ENDED: OnceLock<IntCounterVec> = OnceLock::new();

/// Reconnections reconciled inside the grace window.
pub static RECONNECTIONS: OnceLock<IntCounter> = OnceLock::new();

/// Timers that fired (grace expiry, host-left terminal, checkpoints, sweep).
pub static TIMERS_FIRED: OnceLock<IntCounterVec> = OnceLock::new();

/// Outbound events dropped because a recipient queue was full or closed.
pub static EVENTS_DROPPED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Currently live sessions.
pub static ACTIVE_SESSIONS: OnceLock<IntGauge> = OnceLock::new();

/// Currently connected participants across all sessions.
pub static ACTIVE_PARTICIPANTS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Command processing latency by command type.
pub static COMMAND_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Recipients per broadcast event.
pub static EVENT_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("huddle_command_total", "Commands processed by type"), &["command"]));
    register!(COMMAND_ERRORS, IntCounterVec::new(Opts::new("huddle_command_errors_total", "Command errors by type and code"), &["command", "error"]));
    register!(SESSIONS_ENDED, IntCounterVec::new(Opts::new("huddle_sessions_ended_total", "Sessions ended by reason"), &["reason"]));
    register!(RECONNECTIONS, IntCounter::new("huddle_reconnections_total", "Reconnections reconciled inside the grace window"));
    register!(TIMERS_FIRED, IntCounterVec::new(Opts::new("huddle_timers_fired_total", "Timers fired by kind"), &["timer"]));
    register!(EVENTS_DROPPED, IntCounter::new("huddle_events_dropped_total", "Outbound events dropped due to backpressure"));
    register!(ACTIVE_SESSIONS, IntGauge::new("huddle_active_sessions", "Currently live sessions"));
    register!(ACTIVE_PARTICIPANTS, IntGauge::new("huddle_active_participants", "Currently connected participants"));
    register!(COMMAND_LATENCY, HistogramVec::new(
        HistogramOpts::new("huddle_command_duration_seconds", "Command latency by type")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["command"]));
    register!(EVENT_FANOUT, Histogram::with_opts(
        HistogramOpts::new("huddle_event_fanout", "Recipients per broadcast event")
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0])));
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
// Helper functions for metric updates
// ============================================================================

/// Record a command execution with latency.
#[inline]
pub fn record_command(command: &str, duration_secs: f64) {
    if let Some(c) = COMMAND_COUNTER.get() {
        c.with_label_values(&[command]).inc();
    }
    if let Some(h) = COMMAND_LATENCY.get() {
        h.with_label_values(&[command]).observe(duration_secs);
    }
}

/// Record a command error.
#[inline]
pub fn record_command_error(command: &str, error: &str) {
    if let Some(c) = COMMAND_ERRORS.get() {
        c.with_label_values(&[command, error]).inc();
    }
}

/// Record a session teardown by reason.
#[inline]
pub fn record_session_ended(reason: &str) {
    if let Some(c) = SESSIONS_ENDED.get() {
        c.with_label_values(&[reason]).inc();
    }
    if let Some(g) = ACTIVE_SESSIONS.get() {
        g.dec();
    }
}

/// Record a session start.
#[inline]
pub fn record_session_started() {
    if let Some(g) = ACTIVE_SESSIONS.get() {
        g.inc();
    }
}

/// Record a reconnection reconciled inside the grace window.
#[inline]
pub fn record_reconnection() {
    if let Some(c) = RECONNECTIONS.get() {
        c.inc();
    }
}

/// Record a fired timer by kind.
#[inline]
pub fn record_timer_fired(timer: &str) {
    if let Some(c) = TIMERS_FIRED.get() {
        c.with_label_values(&[timer]).inc();
    }
}

/// Record a dropped outbound event.
#[inline]
pub fn record_event_dropped() {
    if let Some(c) = EVENTS_DROPPED.get() {
        c.inc();
    }
}

/// Record broadcast fan-out (recipients per event).
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = EVENT_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

/// Adjust the live participant gauge.
#[inline]
pub fn participant_delta(delta: i64) {
    if let Some(g) = ACTIVE_PARTICIPANTS.get() {
        g.add(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        record_command("join", 0.001);
        record_session_started();
        record_session_ended("ended by host");

        let output = gather_metrics();
        assert!(output.contains("huddle_command_total"));
        assert!(output.contains("huddle_sessions_ended_total"));
    }
}
