// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade, so calls are no-ops until a recorder is
//! installed.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Parley metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("parley_passes_total", "Processing passes by outcome");
    describe_counter!(
        "parley_lock_rejections_total",
        "Passes skipped because another pass held the session lock"
    );
    describe_counter!(
        "parley_throttled_total",
        "Inbound messages dropped by the reply throttle"
    );
    describe_counter!(
        "parley_completion_calls_total",
        "Completion service calls by result"
    );
    describe_counter!(
        "parley_messages_dispatched_total",
        "Outbound messages accepted by the delivery gateway"
    );
    describe_histogram!(
        "parley_completion_latency_seconds",
        "Completion call latency in seconds"
    );
    describe_gauge!("parley_active_passes", "Processing passes currently running");
}

/// Record a finished processing pass.
pub fn record_pass(outcome: &str) {
    metrics::counter!("parley_passes_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_lock_rejection() {
    metrics::counter!("parley_lock_rejections_total").increment(1);
}

pub fn record_throttled() {
    metrics::counter!("parley_throttled_total").increment(1);
}

/// Record a completion call and its latency.
pub fn record_completion_call(result: &str, seconds: f64) {
    metrics::counter!("parley_completion_calls_total", "result" => result.to_string()).increment(1);
    metrics::histogram!("parley_completion_latency_seconds").record(seconds);
}

/// Record an outbound message by kind (`text`, `image`, ...).
pub fn record_dispatch(kind: &str) {
    metrics::counter!("parley_messages_dispatched_total", "kind" => kind.to_string())
        .increment(1);
}

pub fn set_active_passes(count: f64) {
    metrics::gauge!("parley_active_passes").set(count);
}
