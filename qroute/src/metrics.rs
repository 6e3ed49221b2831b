//! Routing metrics

use std::time::Duration;

/// Record the outcome of one move attempt
pub fn record_route_attempt(outcome: &str) {
    metrics::counter!(
        "qroute_route_attempts_total",
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

/// Record a job aborted by the routing engine
pub fn record_route_abort(reason: &str) {
    metrics::counter!(
        "qroute_route_aborts_total",
        "reason" => reason.to_string(),
    )
    .increment(1);
}

/// Record a completed queue sweep
pub fn record_sweep(queue: &str, examined: usize, duration: Duration) {
    metrics::histogram!(
        "qroute_sweep_duration_seconds",
        "queue" => queue.to_string(),
    )
    .record(duration.as_secs_f64());

    metrics::counter!(
        "qroute_sweep_jobs_examined_total",
        "queue" => queue.to_string(),
    )
    .increment(examined as u64);
}
