//! Dispatch observability metrics
//!
//! Counters and histograms for per-instance RPCs, cross-instance
//! relocations and the instance server. No exporter is installed here;
//! the embedding process decides where metrics go.

use crate::error::Result;
use std::time::{Duration, Instant};

/// Record a relocate-and-retry step (unknown job id on one instance)
pub fn record_relocation(operation: &str) {
    metrics::counter!(
        "qroute_dispatch_relocations_total",
        "op" => operation.to_string(),
    )
    .increment(1);
}

/// Record whether the location hint pointed at the answering instance
pub fn record_hint_lookup(hit: bool) {
    metrics::counter!(
        "qroute_location_hint_lookups_total",
        "result" => if hit { "hit" } else { "miss" },
    )
    .increment(1);
}

/// Record a request served by the instance server
pub fn record_handler_request(operation: &str, code: u32, duration: Duration) {
    let status = if code == 0 { "ok" } else { "error" };
    metrics::counter!(
        "qroute_server_requests_total",
        "op" => operation.to_string(),
        "status" => status,
    )
    .increment(1);

    metrics::histogram!(
        "qroute_server_request_duration_seconds",
        "op" => operation.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Times one per-instance RPC and records its outcome.
///
/// Feeds `qroute_rpc_duration_seconds`, `qroute_rpc_requests_total` and, on
/// failure, `qroute_rpc_errors_total`.
pub struct RpcTimer {
    operation: &'static str,
    instance: String,
    start: Instant,
}

impl RpcTimer {
    pub fn new(operation: &'static str, instance: &str) -> Self {
        Self {
            operation,
            instance: instance.to_string(),
            start: Instant::now(),
        }
    }

    /// Record the call's duration and whether it succeeded
    pub fn observe<T>(self, result: &Result<T>) {
        let op = self.operation;
        metrics::histogram!(
            "qroute_rpc_duration_seconds",
            "op" => op,
            "instance" => self.instance.clone(),
        )
        .record(self.start.elapsed().as_secs_f64());

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            "qroute_rpc_requests_total",
            "op" => op,
            "instance" => self.instance,
            "status" => status,
        )
        .increment(1);

        if let Err(e) = result {
            metrics::counter!(
                "qroute_rpc_errors_total",
                "op" => op,
                "error_type" => e.error_type(),
            )
            .increment(1);
        }
    }
}
