use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/discord/signal", post(handlers::signals::ingest_signal))
        .route(
            "/api/v1/discord/signal/update",
            post(handlers::signals::ingest_signal_update),
        )
        .route("/health", get(handlers::health::health_check))
        .route("/websocket/status", get(handlers::stream::websocket_status))
        .route("/scheduler/status", get(handlers::scheduler::scheduler_status))
        .route(
            "/scheduler/run/{loop_name}",
            post(handlers::scheduler::run_loop),
        )
        .route("/metrics", get(handlers::metrics::metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
