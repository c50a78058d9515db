//! Prometheus counters for intake and the request watcher.
//!
//! Registered lazily in the global default registry and exposed at `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

pub static REQUESTS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "maintdesk_requests_submitted_total",
        "Maintenance requests accepted by the intake endpoint"
    ))
    .expect("failed to register maintdesk_requests_submitted_total")
});

/// Labelled by `outcome`: `sent`, `failed` or `skipped`.
pub static NOTIFICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "maintdesk_notifications_total",
            "Admin notifications attempted by the request watcher"
        ),
        &["outcome"]
    )
    .expect("failed to register maintdesk_notifications_total")
});

/// Labelled by `kind`: a store error kind, or `unexpected` for loop-level failures.
pub static POLL_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "maintdesk_poll_errors_total",
            "Request watcher poll cycles that ended in an error"
        ),
        &["kind"]
    )
    .expect("failed to register maintdesk_poll_errors_total")
});

/// Encode all registered metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_output() {
        NOTIFICATIONS.with_label_values(&["sent"]).inc();
        let output = encode_metrics();
        assert!(output.contains("maintdesk_notifications_total"));
    }
}
