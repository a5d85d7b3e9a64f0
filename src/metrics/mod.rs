//! Prometheus metrics for the realtime service.
//!
//! Gauges are refreshed from live state by the /metrics endpoint; counters
//! are bumped at the call sites in the handlers and the dispatcher.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    IntCounter, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "arena_rt";

lazy_static! {
    /// Active WebSocket connections, per service (collab | notify)
    pub static ref CONNECTIONS_TOTAL: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Active WebSocket connections",
        &["service"]
    ).unwrap();

    /// Unique connected users, per service
    pub static ref USERS_CONNECTED: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_users_connected", METRIC_PREFIX),
        "Unique connected users",
        &["service"]
    ).unwrap();

    /// Collaboration rooms currently alive
    pub static ref ROOMS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_rooms_active", METRIC_PREFIX),
        "Collaboration rooms with at least one member"
    ).unwrap();

    /// Notification channels with at least one subscriber
    pub static ref CHANNELS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_channels_active", METRIC_PREFIX),
        "Notification channels with at least one subscriber"
    ).unwrap();

    /// Connections opened since start, per service
    pub static ref CONNECTIONS_OPENED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "WebSocket connections opened",
        &["service"]
    ).unwrap();

    /// Connections closed since start, per service
    pub static ref CONNECTIONS_CLOSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "WebSocket connections closed",
        &["service"]
    ).unwrap();

    /// Connections rejected by the gatekeeper
    pub static ref AUTH_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_auth_rejections_total", METRIC_PREFIX),
        "Connections closed with policy code 1008",
        &["service"]
    ).unwrap();

    /// Inbound frames routed, by message type
    pub static ref MESSAGES_ROUTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_routed_total", METRIC_PREFIX),
        "Inbound frames routed to a handler",
        &["type"]
    ).unwrap();

    /// Frames enqueued to a recipient connection
    pub static ref FRAMES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_delivered_total", METRIC_PREFIX),
        "Frames enqueued to recipient connections"
    ).unwrap();

    /// Frames dropped for unreachable recipients
    pub static ref FRAMES_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_dropped_total", METRIC_PREFIX),
        "Frames dropped because a recipient was unreachable"
    ).unwrap();

    /// Platform events published, by event kind
    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_published_total", METRIC_PREFIX),
        "Platform events published to the notification channel",
        &["kind"]
    ).unwrap();
}

/// Connection open/close counters, namespaced per service.
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened(service: &str) {
        CONNECTIONS_OPENED_TOTAL.with_label_values(&[service]).inc();
    }

    pub fn record_closed(service: &str) {
        CONNECTIONS_CLOSED_TOTAL.with_label_values(&[service]).inc();
    }

    pub fn record_auth_rejected(service: &str) {
        AUTH_REJECTIONS_TOTAL.with_label_values(&[service]).inc();
    }
}

pub struct RouterMetrics;

impl RouterMetrics {
    pub fn record(message_type: &str) {
        MESSAGES_ROUTED_TOTAL.with_label_values(&[message_type]).inc();
    }
}

pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record(delivered: u64, dropped: u64) {
        if delivered > 0 {
            FRAMES_DELIVERED_TOTAL.inc_by(delivered);
        }
        if dropped > 0 {
            FRAMES_DROPPED_TOTAL.inc_by(dropped);
        }
    }
}

pub struct PublishMetrics;

impl PublishMetrics {
    pub fn record(kind: &str) {
        EVENTS_PUBLISHED_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families)
}
