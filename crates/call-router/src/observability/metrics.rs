//! Metrics recording helpers.
//!
//! Thin wrappers over the `metrics` facade so handler code records
//! outcomes with consistent names and labels.

use metrics::counter;

/// Record the outcome of one webhook delivery.
///
/// `kind` is the normalized event kind; `outcome` is one of
/// `processed`, `replayed`, `rejected`, `invalid`, `transient_error`,
/// `fatal_error`.
pub fn record_webhook_event(kind: &str, outcome: &str) {
    counter!(
        "router_webhook_events_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

/// Record a routing decision by outcome shape.
pub fn record_decision(outcome: &str) {
    counter!(
        "router_decisions_total",
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}
