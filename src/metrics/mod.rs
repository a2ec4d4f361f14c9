//! Prometheus metrics for the event store service.
//!
//! - Message metrics (received, dropped by reason)
//! - Event metrics (stored, failed by reason)
//! - Template metrics (catalog size, missing codes, render errors, clipped fields)

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "event_store";

lazy_static! {
    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Total messages received from the bus
    pub static ref MESSAGES_RECEIVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_received_total", METRIC_PREFIX),
        "Total messages received from the bus"
    ).unwrap();

    /// Messages acknowledged without storing anything
    pub static ref MESSAGES_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_dropped_total", METRIC_PREFIX),
        "Messages dropped without storing an event",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Event Metrics
    // ============================================================================

    /// Events written to storage
    pub static ref EVENTS_STORED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_stored_total", METRIC_PREFIX),
        "Total events written to storage"
    ).unwrap();

    /// Events that could not be stored
    pub static ref EVENTS_FAILED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_failed_total", METRIC_PREFIX),
        "Events that could not be stored",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Template Metrics
    // ============================================================================

    /// Templates in the loaded catalog
    pub static ref TEMPLATES_LOADED: IntGauge = register_int_gauge!(
        format!("{}_templates_loaded", METRIC_PREFIX),
        "Number of templates in the loaded catalog"
    ).unwrap();

    /// Event codes that did not resolve to a template
    pub static ref TEMPLATE_MISSES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_misses_total", METRIC_PREFIX),
        "Event codes not found in the template catalog"
    ).unwrap();

    /// Fields replaced by their render error
    pub static ref TEMPLATE_RENDER_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_template_render_errors_total", METRIC_PREFIX),
        "Event fields that failed to render",
        &["field"]
    ).unwrap();

    /// Fields cut to their maximum length
    pub static ref FIELDS_CLIPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_fields_clipped_total", METRIC_PREFIX),
        "Event fields clipped to their maximum length",
        &["field"]
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
