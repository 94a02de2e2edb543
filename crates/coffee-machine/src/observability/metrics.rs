//! Metrics definitions for the coffee machine controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `coffee_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `command`: 4 values (make, init, fund, close)
//! - `outcome`: 4 values (accepted, dropped, succeeded, failed)
//! - `state`: 10 values (`LifecycleState` variants)
//! - `verb`: 10 values (channel service verbs)
//! - `operation`: 4 values (initialize, fund, pay, close)
//! - `status`: 3 values (success, error, transport)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded. Channel service calls
/// build and sign bundles, so their buckets reach well into seconds.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("coffee_remote_call_duration_seconds".to_string()),
            &[
                0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000, 60.000,
            ],
        )
        .map_err(|e| format!("Failed to set remote call buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full("coffee_operation_duration_seconds".to_string()),
            &[
                0.100, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000, 60.000, 120.000, 300.000,
            ],
        )
        .map_err(|e| format!("Failed to set operation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Record a received command and what the dispatcher did with it.
///
/// Metric: `coffee_commands_total`
/// Labels: `command`, `outcome`
pub fn record_command(command: &'static str, outcome: &'static str) {
    counter!("coffee_commands_total", "command" => command, "outcome" => outcome).increment(1);
}

/// Record a lifecycle state transition.
///
/// Metric: `coffee_state_transitions_total`
/// Labels: `state`
pub fn record_state_transition(state: &'static str) {
    counter!("coffee_state_transitions_total", "state" => state).increment(1);
}

/// Record a channel service call.
///
/// Metric: `coffee_remote_call_duration_seconds`
/// Labels: `verb`, `status`
pub fn record_remote_call(verb: &'static str, status: &'static str, duration: Duration) {
    histogram!("coffee_remote_call_duration_seconds",
        "verb" => verb,
        "status" => status
    )
    .record(duration.as_secs_f64());
}

/// Record a lifecycle operation.
///
/// Metric: `coffee_operation_duration_seconds`
/// Labels: `operation`, `status`
pub fn record_operation(operation: &'static str, status: &'static str, duration: Duration) {
    histogram!("coffee_operation_duration_seconds",
        "operation" => operation,
        "status" => status
    )
    .record(duration.as_secs_f64());
}
