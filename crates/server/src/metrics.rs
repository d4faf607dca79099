//! Prometheus recorder, HTTP request metrics and the pipeline observer.

use echo::{AssignmentKind, PipelineError, PipelineMetrics};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder.
///
/// A second install in the same process (tests) falls back to a detached
/// recorder so every caller still gets a handle.
pub fn install_recorder() -> PrometheusHandle {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(err) => {
            tracing::debug!(error = %err, "prometheus recorder already installed");
            PrometheusBuilder::new().build_recorder().handle()
        }
    }
}

/// Records HTTP request metrics.
pub fn record_request(method: &str, path: &str, status: u16, duration: Duration) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];
    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(duration.as_secs_f64());
}

fn outcome<T>(result: &Result<T, PipelineError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(err) => err.code(),
    }
}

/// Forwards stage events from the analyzer to the `metrics` facade.
pub struct PrometheusPipelineMetrics;

impl PipelineMetrics for PrometheusPipelineMetrics {
    fn record_embedding(&self, latency: Duration, result: Result<(), PipelineError>) {
        counter!("echo_embeddings_total", "outcome" => outcome(&result)).increment(1);
        histogram!("echo_embedding_duration_seconds").record(latency.as_secs_f64());
    }

    fn record_clustering(&self, latency: Duration, result: Result<AssignmentKind, PipelineError>) {
        match &result {
            Ok(kind) => {
                counter!("echo_assignments_total", "kind" => kind.as_str()).increment(1);
            }
            Err(err) => {
                counter!("echo_clustering_failures_total", "reason" => err.code()).increment(1);
            }
        }
        histogram!("echo_clustering_duration_seconds").record(latency.as_secs_f64());
    }

    fn record_forward(&self, latency: Duration, result: Result<(), PipelineError>) {
        counter!("echo_forwards_total", "outcome" => outcome(&result)).increment(1);
        histogram!("echo_forward_duration_seconds").record(latency.as_secs_f64());
    }
}
