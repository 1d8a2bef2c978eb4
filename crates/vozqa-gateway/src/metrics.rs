//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// Record one finished pipeline run (`outcome` is "ok" or "error").
pub fn record_request(outcome: &'static str) {
    metrics::counter!("pipeline_requests_total", "outcome" => outcome).increment(1);
}

/// Record how long one pipeline stage took.
pub fn record_stage(stage: &'static str, duration_secs: f64) {
    metrics::histogram!("pipeline_stage_duration_seconds", "stage" => stage).record(duration_secs);
}

/// Record a failed run by error kind.
pub fn record_error(kind: &'static str) {
    metrics::counter!("pipeline_errors_total", "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_prometheus_recorder() {
        // Only one recorder per process; this is the only test that installs one.
        let handle = install_prometheus_recorder().unwrap();
        record_request("ok");
        record_stage("transcribing", 0.25);
        record_error("generation");

        let output = handle.render();
        assert!(output.contains("pipeline_requests_total"));
        assert!(output.contains("outcome=\"ok\""));
        assert!(output.contains("pipeline_errors_total"));
    }

    #[test]
    fn test_record_without_recorder_does_not_panic() {
        record_stage("generating", 0.1);
        record_error("synthesis");
    }
}
