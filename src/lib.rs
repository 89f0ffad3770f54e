pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod fees;
pub mod ingestion;
pub mod metrics;
pub mod models;
pub mod pricing;
pub mod services;
pub mod signals;
pub mod sync;
pub mod venue;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::ingestion::StreamStatus;
use crate::models::SignalEvent;
use crate::sync::Scheduler;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: AppConfig,
    /// Ingress queue: handlers enqueue, the router worker drains.
    pub signal_tx: mpsc::Sender<SignalEvent>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
    pub scheduler: Arc<Scheduler>,
    pub stream_status: Arc<StreamStatus>,
    pub started_at: Instant,
}
