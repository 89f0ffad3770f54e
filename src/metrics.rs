use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Counters registered up front so scrapes see them at zero instead of
/// having them appear only after the first event.
const COUNTERS: [&str; 9] = [
    "signals_received",
    "alerts_received",
    "alerts_applied",
    "trades_opened",
    "trades_rejected",
    "orders_placed",
    "orders_failed",
    "stream_order_updates",
    "stream_account_updates",
];

/// Set up the Prometheus recorder and hand back the handle the `/metrics`
/// endpoint renders from.
///
/// Only one global recorder can exist per process. When a second caller
/// (another test in the same binary) tries to install, fall back to a
/// detached recorder so the returned handle still renders.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle());

    for name in COUNTERS {
        counter!(name).absolute(0);
    }

    handle
}
