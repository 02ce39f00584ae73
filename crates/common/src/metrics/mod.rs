//! Metrics and observability utilities
//!
//! Prometheus metrics through the `metrics` facade with standardized naming.
//! The gateway installs the exporter; the CLI records into the no-op recorder.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all RefGraph metrics
pub const METRICS_PREFIX: &str = "refgraph";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
];

/// Buckets for provider calls (network + download + extraction)
pub const PROVIDER_BUCKETS: &[f64] = &[
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
    60.00, // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Expansion metrics
    describe_counter!(
        format!("{}_expansion_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Expansion runs by final state"
    );

    describe_histogram!(
        format!("{}_expansion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Expansion run wall time in seconds"
    );

    describe_gauge!(
        format!("{}_expansion_runs_active", METRICS_PREFIX),
        Unit::Count,
        "Expansion runs currently executing"
    );

    describe_counter!(
        format!("{}_nodes_total", METRICS_PREFIX),
        Unit::Count,
        "Document nodes materialized, by outcome (created, reused, stub)"
    );

    describe_counter!(
        format!("{}_edges_created_total", METRICS_PREFIX),
        Unit::Count,
        "Citation edges created"
    );

    describe_counter!(
        format!("{}_candidates_parsed_total", METRICS_PREFIX),
        Unit::Count,
        "Citation candidates extracted by the parser"
    );

    describe_counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        Unit::Count,
        "Entity resolutions by matching rule"
    );

    // Provider metrics
    describe_counter!(
        format!("{}_provider_attempts_total", METRICS_PREFIX),
        Unit::Count,
        "Provider attempts by provider and outcome"
    );

    describe_histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Provider attempt latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a finished expansion run
pub fn record_run(state: &str, duration_secs: f64) {
    counter!(
        format!("{}_expansion_runs_total", METRICS_PREFIX),
        "state" => state.to_string()
    )
    .increment(1);

    histogram!(format!("{}_expansion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Track the number of runs in flight
pub fn record_active_runs(delta: f64) {
    gauge!(format!("{}_expansion_runs_active", METRICS_PREFIX)).increment(delta);
}

/// Record a materialized node (`created`, `reused` or `stub`)
pub fn record_node(outcome: &str) {
    counter!(
        format!("{}_nodes_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_edge() {
    counter!(format!("{}_edges_created_total", METRICS_PREFIX)).increment(1);
}

pub fn record_candidates(count: usize) {
    counter!(format!("{}_candidates_parsed_total", METRICS_PREFIX)).increment(count as u64);
}

/// Record which resolver rule decided a candidate
pub fn record_resolution(rule: &str) {
    counter!(
        format!("{}_resolutions_total", METRICS_PREFIX),
        "rule" => rule.to_string()
    )
    .increment(1);
}

/// Record one provider attempt
pub fn record_provider_attempt(provider: &str, outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_provider_attempts_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, PROVIDER_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every call is a no-op
        let metrics = RequestMetrics::start("GET", "/v1/documents");
        metrics.finish(200);
        record_provider_attempt("arxiv", "miss", 0.2);
        record_node("stub");
        record_run("done", 1.5);
    }
}
