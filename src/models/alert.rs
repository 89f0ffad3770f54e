use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;

/// Database row for the alerts table. One row per follow-up signal, keyed to
/// its parent trade by the parent's discord_id (the `trade` column).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alert {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub discord_id: Option<String>,
    /// Parent trade's discord_id.
    pub trade: String,
    pub content: String,
    pub trader: Option<String>,
    pub parsed_alert: Option<Value>,
    pub binance_response: Option<Value>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Received,
    Parsed,
    Applied,
    Skipped,
    Failed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Received => "received",
            AlertStatus::Parsed => "parsed",
            AlertStatus::Applied => "applied",
            AlertStatus::Skipped => "skipped",
            AlertStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
