use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, TextEncoder,
};

use crate::models::{ChannelKind, ConnectionState};

static FRAMES_RECEIVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_realtime_frames_received_total",
            "Inbound push frames by channel and classified kind",
        ),
        &["channel", "kind"],
    )
    .expect("failed to create notification_realtime_frames_received_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_realtime_frames_received_total");
    counter
});

static FRAMES_DROPPED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_realtime_frames_dropped_total",
            "Inbound push frames dropped as malformed or unrecognized",
        ),
        &["channel", "reason"],
    )
    .expect("failed to create notification_realtime_frames_dropped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_realtime_frames_dropped_total");
    counter
});

static RECONNECT_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_realtime_reconnect_attempts_total",
            "Reconnect attempts per push channel",
        ),
        &["channel"],
    )
    .expect("failed to create notification_realtime_reconnect_attempts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_realtime_reconnect_attempts_total");
    counter
});

static CONNECTION_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    let gauge = IntGaugeVec::new(
        Opts::new(
            "notification_realtime_connection_state",
            "Current channel state (0 idle, 1 connecting, 2 connected, 3 reconnecting, 4 disconnected, 5 error)",
        ),
        &["channel"],
    )
    .expect("failed to create notification_realtime_connection_state");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register notification_realtime_connection_state");
    gauge
});

static OPTIMISTIC_COMPENSATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_realtime_optimistic_compensations_total",
            "Optimistic mutations undone after a failed remote call",
        ),
        &["operation", "strategy"],
    )
    .expect("failed to create notification_realtime_optimistic_compensations_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_realtime_optimistic_compensations_total");
    counter
});

static TOAST_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_realtime_toast_events_total",
            "Toast lifecycle events (shown, evicted, expired, dismissed)",
        ),
        &["event"],
    )
    .expect("failed to create notification_realtime_toast_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_realtime_toast_events_total");
    counter
});

static API_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "notification_realtime_api_request_duration_seconds",
            "Latency of notification API calls",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation", "outcome"],
    )
    .expect("failed to create notification_realtime_api_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register notification_realtime_api_request_duration_seconds");
    histogram
});

pub fn record_frame(channel: ChannelKind, kind: &str) {
    FRAMES_RECEIVED_TOTAL
        .with_label_values(&[channel.as_str(), kind])
        .inc();
}

pub fn record_dropped_frame(channel: ChannelKind, reason: &str) {
    FRAMES_DROPPED_TOTAL
        .with_label_values(&[channel.as_str(), reason])
        .inc();
}

pub fn record_reconnect_attempt(channel: ChannelKind) {
    RECONNECT_ATTEMPTS_TOTAL
        .with_label_values(&[channel.as_str()])
        .inc();
}

pub fn set_connection_state(channel: ChannelKind, state: ConnectionState) {
    CONNECTION_STATE
        .with_label_values(&[channel.as_str()])
        .set(state.gauge_value());
}

pub fn record_compensation(operation: &str, strategy: &str) {
    OPTIMISTIC_COMPENSATIONS_TOTAL
        .with_label_values(&[operation, strategy])
        .inc();
}

pub fn record_toast_event(event: &str) {
    TOAST_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

pub fn observe_api_call(operation: &str, success: bool, elapsed: Duration) {
    let outcome = if success { "ok" } else { "error" };
    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation, outcome])
        .observe(elapsed.as_secs_f64());
}

/// Prometheus text exposition of everything on the default registry
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {err}\n");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
