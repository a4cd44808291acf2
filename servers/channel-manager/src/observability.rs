//! Process-wide Prometheus recorder installed once at startup. Registries
//! are global by design (see circuit/ratelimit modules, which record
//! straight into the `metrics` facade) — this just wires the actual
//! exporter behind them and renders it for the `/metrics` route.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the recorder and pre-describes every metric this service emits,
/// across the rate limiter, circuit breaker, webhook ingress, and sync log.
/// Idempotent in the sense that a second call is a harmless no-op: the
/// handle is only ever set once.
pub fn init() {
    let builder = PrometheusBuilder::new();
    let handle = match builder.install_recorder() {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "failed to install Prometheus recorder");
            return;
        }
    };
    PROMETHEUS_HANDLE.set(handle).ok();

    metrics::describe_counter!("ratelimit_acquired_total", "Rate-limit requests allowed, per channel");
    metrics::describe_counter!("ratelimit_rejected_total", "Rate-limit requests denied, per channel");
    metrics::describe_counter!("ratelimit_blocked_total", "Requests blocked by a standing remote-rejection, per channel");
    metrics::describe_gauge!("ratelimit_current_count", "Current rate-limit quota in use, per channel");
    metrics::describe_histogram!("ratelimit_wait_seconds", "Time spent waiting inside acquire_with_wait, per channel");

    metrics::describe_gauge!("circuit_state", "Circuit breaker state per channel: 0=CLOSED, 1=OPEN, 2=HALF_OPEN");
    metrics::describe_counter!("circuit_transitions_total", "Circuit breaker state transitions, labeled from/to");
    metrics::describe_counter!("circuit_rejected_total", "Calls rejected by an open or exhausted circuit, per channel");
    metrics::describe_counter!("circuit_successes_total", "Calls recorded as successes, per channel");
    metrics::describe_counter!("circuit_failures_total", "Calls recorded as failures, per channel");
    metrics::describe_counter!("circuit_tripped_total", "Times a circuit tripped to OPEN, per channel");

    metrics::describe_counter!("webhook_received_total", "Webhooks received, labeled channel and status");
    metrics::describe_histogram!("webhook_processing_seconds", "End-to-end webhook handler latency, per channel");

    metrics::describe_counter!("sync_log_total", "Sync log rows written, labeled task_type/direction/status");

    tracing::info!("Prometheus metrics installed");
}

pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# metrics not initialized\n".to_string())
}
