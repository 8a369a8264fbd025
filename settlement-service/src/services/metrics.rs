use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record an initiation attempt by outcome (`initiated` / `failed`).
pub fn record_initiation(outcome: &str) {
    metrics::counter!("settlement_initiations_total", "outcome" => outcome.to_string())
        .increment(1);
}

/// Record a reconciled callback by normalized payment status.
pub fn record_callback(status: &str) {
    metrics::counter!("settlement_callbacks_total", "status" => status.to_string()).increment(1);
}

/// Record an audit sweep repair of a missed order transition.
pub fn record_audit_repair() {
    metrics::counter!("settlement_audit_repairs_total").increment(1);
}
