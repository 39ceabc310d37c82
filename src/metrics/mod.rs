//! Prometheus metrics for the synchronization service
//!
//! This module tracks:
//! - Sessions: connected users, connections, edits, cursor relays, client errors
//! - Fanout: published/received updates and publish failures
//! - Execution gateway: runs by language and outcome
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! Before initialization (and in tests) metric operations are no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};
use std::sync::{Mutex, OnceLock};

// ============================================================================
// Metrics Storage
// ============================================================================

struct SessionMetrics {
    connected_users: Gauge,
    connections_total: Counter,
    document_edits: Counter,
    cursor_relays: Counter,
    client_errors: CounterVec,
    stalled_connections: Counter,
}

struct FanoutMetrics {
    published: Counter,
    publish_errors: Counter,
    received: Counter,
}

struct ExecutionMetrics {
    runs: CounterVec,
}

struct Metrics {
    session: SessionMetrics,
    fanout: FanoutMetrics,
    execution: ExecutionMetrics,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Serializes registration so concurrent callers never double-register
static INIT_LOCK: Mutex<()> = Mutex::new(());

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics with the default Prometheus registry
///
/// Calling this more than once is harmless.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if METRICS.get().is_some() {
        return Ok(());
    }

    let metrics = Metrics {
        session: SessionMetrics {
            connected_users: register_gauge!(
                "logline_connected_users",
                "Number of connections currently open on this process"
            )?,
            connections_total: register_counter!(
                "logline_connections_total",
                "Total connections accepted"
            )?,
            document_edits: register_counter!(
                "logline_document_edits_total",
                "Total document edits received from local clients"
            )?,
            cursor_relays: register_counter!(
                "logline_cursor_relays_total",
                "Total cursor moves relayed to local peers"
            )?,
            client_errors: register_counter_vec!(
                "logline_client_errors_total",
                "Total error events sent to clients",
                &["event"]
            )?,
            stalled_connections: register_counter!(
                "logline_stalled_connections_total",
                "Total connections cut off because their outbox was full"
            )?,
        },
        fanout: FanoutMetrics {
            published: register_counter!(
                "logline_fanout_published_total",
                "Total updates published on the broadcast topic"
            )?,
            publish_errors: register_counter!(
                "logline_fanout_publish_errors_total",
                "Total failed publish attempts"
            )?,
            received: register_counter!(
                "logline_fanout_received_total",
                "Total updates received from the broadcast topic"
            )?,
        },
        execution: ExecutionMetrics {
            runs: register_counter_vec!(
                "logline_executions_total",
                "Total execution requests by language and outcome",
                &["language", "outcome"]
            )?,
        },
    };

    let _ = METRICS.set(metrics);

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// ============================================================================
// Recorders
// ============================================================================

pub fn record_connect(connected: usize) {
    if let Some(m) = METRICS.get() {
        m.session.connections_total.inc();
        m.session.connected_users.set(connected as f64);
    }
}

pub fn record_disconnect(connected: usize) {
    if let Some(m) = METRICS.get() {
        m.session.connected_users.set(connected as f64);
    }
}

pub fn record_edit() {
    if let Some(m) = METRICS.get() {
        m.session.document_edits.inc();
    }
}

pub fn record_cursor_relay() {
    if let Some(m) = METRICS.get() {
        m.session.cursor_relays.inc();
    }
}

pub fn record_client_error(event: &str) {
    if let Some(m) = METRICS.get() {
        m.session.client_errors.with_label_values(&[event]).inc();
    }
}

pub fn record_stalled_connection() {
    if let Some(m) = METRICS.get() {
        m.session.stalled_connections.inc();
    }
}

pub fn record_publish(success: bool) {
    let Some(m) = METRICS.get() else {
        return;
    };

    if success {
        m.fanout.published.inc();
    } else {
        m.fanout.publish_errors.inc();
    }
}

pub fn record_fanout_received() {
    if let Some(m) = METRICS.get() {
        m.fanout.received.inc();
    }
}

pub fn record_execution(language: &str, outcome: &str) {
    if let Some(m) = METRICS.get() {
        m.execution.runs.with_label_values(&[language, outcome]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent_and_encodes() {
        init_metrics().unwrap();
        init_metrics().unwrap();
        assert!(metrics_initialized());

        record_connect(1);
        record_edit();
        record_execution("javascript", "ok");

        let text = encode_metrics().unwrap();
        assert!(text.contains("logline_connected_users"));
        assert!(text.contains("logline_executions_total"));
    }
}
