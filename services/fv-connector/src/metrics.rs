//! Prometheus metrics exposition
//!
//! - `connector_requests_total` (counter): label `status`
//! - `connector_request_duration_seconds` (histogram): label `status`
//! - `connector_upstream_errors_total` (counter): label `error_type`
//! - `connector_token_exchanges_total` (counter): label `outcome`, recorded
//!   by the token cache in `filevine-auth`

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "connector_request_duration_seconds";

/// Bucket boundaries from 5ms to 60s. Outbound calls have no timeout of
/// their own, so the top bucket is open-ended via `+Inf`.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

fn builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .context("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle> {
    builder()?
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Record a completed `/fv` call with the status returned to the caller.
pub fn record_request(status: u16, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("connector_requests_total", "status" => status_str.clone()).increment(1);
    metrics::histogram!(DURATION_METRIC, "status" => status_str).record(duration_secs);
}

/// Record an upstream transport failure with a classification label.
pub fn record_upstream_error(error_type: &'static str) {
    metrics::counter!("connector_upstream_errors_total", "error_type" => error_type)
        .increment(1);
}
