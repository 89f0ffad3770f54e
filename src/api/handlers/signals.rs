use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::errors::AppError;
use crate::models::SignalEvent;
use crate::signals::normalize_timestamp;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub timestamp: String,
    pub content: String,
    pub structured: Option<String>,
    pub discord_id: Option<String>,
    pub trader: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SignalUpdateRequest {
    pub timestamp: String,
    pub content: String,
    /// Parent trade's discord_id.
    pub trade: String,
    pub discord_id: Option<String>,
    pub trader: Option<String>,
}

/// `POST /api/v1/discord/signal`: accept an initial signal, 202 and queue.
/// Well-formed payloads always get a 2xx; per-trade outcomes land on the
/// persistent row.
pub async fn ingest_signal(
    State(state): State<AppState>,
    Json(request): Json<SignalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let timestamp = parse_signal_timestamp(&request.timestamp)?;
    let event = SignalEvent {
        timestamp,
        content: request.content,
        structured: request.structured,
        discord_id: request.discord_id,
        parent_ref: None,
        trader: request.trader,
    };

    state
        .signal_tx
        .send(event)
        .await
        .map_err(|_| AppError::Internal(anyhow::anyhow!("signal queue closed")))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted" })),
    ))
}

/// `POST /api/v1/discord/signal/update`: accept a follow-up alert.
pub async fn ingest_signal_update(
    State(state): State<AppState>,
    Json(request): Json<SignalUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.trade.trim().is_empty() {
        return Err(AppError::BadRequest("trade reference must be non-empty".into()));
    }
    let timestamp = parse_signal_timestamp(&request.timestamp)?;
    let event = SignalEvent {
        timestamp,
        content: request.content,
        structured: None,
        discord_id: request.discord_id,
        parent_ref: Some(request.trade),
        trader: request.trader,
    };

    state
        .signal_tx
        .send(event)
        .await
        .map_err(|_| AppError::Internal(anyhow::anyhow!("signal queue closed")))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted" })),
    ))
}

/// Millisecond-precision ISO-8601, with or without the trailing `Z`. The
/// `Z` is normalized off so equal instants always bind to the same row.
fn parse_signal_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let normalized = normalize_timestamp(raw.trim());
    if let Ok(naive) = NaiveDateTime::parse_from_str(normalized, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::BadRequest(format!("unparseable timestamp: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_with_z_and_without_bind_identically() {
        let with_z = parse_signal_timestamp("2025-01-05T10:15:30.123Z").unwrap();
        let without_z = parse_signal_timestamp("2025-01-05T10:15:30.123").unwrap();
        assert_eq!(with_z, without_z);
        assert_eq!(with_z.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn offset_timestamps_are_accepted() {
        let ts = parse_signal_timestamp("2025-01-05T10:15:30.123+02:00").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_signal_timestamp("yesterday").is_err());
    }
}
