use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::errors::AppError;
use crate::sync::Scheduler;
use crate::AppState;

pub async fn scheduler_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.status().await)
}

/// `POST /scheduler/run/:loop_name` — manual trigger, idempotent. A loop
/// already running reports `triggered: false`.
pub async fn run_loop(
    State(state): State<AppState>,
    Path(loop_name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !Scheduler::is_known_loop(&loop_name) {
        return Err(AppError::NotFound(format!("unknown loop: {loop_name}")));
    }

    let triggered = state.scheduler.run_loop(&loop_name).await;
    Ok((
        StatusCode::OK,
        Json(json!({ "loop": loop_name, "triggered": triggered })),
    ))
}
