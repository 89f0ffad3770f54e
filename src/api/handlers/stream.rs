use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::atomic::Ordering;

use crate::AppState;

pub async fn websocket_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = &state.stream_status;
    Json(json!({
        "connected": status.connected.load(Ordering::Relaxed),
        "last_event_ms": status.last_event_ms.load(Ordering::Relaxed),
        "reconnects": status.reconnects.load(Ordering::Relaxed),
    }))
}
