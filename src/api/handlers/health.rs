use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::atomic::Ordering;

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    let ws_connected = state.stream_status.connected.load(Ordering::Relaxed);

    let status = if db_ok { "healthy" } else { "unhealthy" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "uptime_secs": state.started_at.elapsed().as_secs(),
            "subcomponents": {
                "database": if db_ok { "connected" } else { "disconnected" },
                "websocket": if ws_connected { "connected" } else { "disconnected" },
                "scheduler": "running",
            },
        })),
    )
}
