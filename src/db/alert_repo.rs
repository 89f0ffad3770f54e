use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::models::{Alert, AlertStatus};

/// Insert a follow-up alert row bound to its parent trade's discord_id.
pub async fn insert_alert(
    pool: &PgPool,
    timestamp: DateTime<Utc>,
    discord_id: Option<&str>,
    parent_discord_id: &str,
    content: &str,
    trader: Option<&str>,
) -> anyhow::Result<Alert> {
    let alert = sqlx::query_as::<_, Alert>(
        r#"
        INSERT INTO alerts (timestamp, discord_id, trade, content, trader)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(timestamp)
    .bind(discord_id)
    .bind(parent_discord_id)
    .bind(content)
    .bind(trader)
    .fetch_one(pool)
    .await?;

    Ok(alert)
}

pub async fn set_parsed_alert(pool: &PgPool, id: i64, parsed: &Value) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE alerts SET parsed_alert = $2, status = 'parsed', updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(parsed)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the outcome of applying an alert. Failures are recorded but the
/// row is retained.
pub async fn record_outcome(
    pool: &PgPool,
    id: i64,
    status: AlertStatus,
    response: &Value,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE alerts SET status = $2, binance_response = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(response)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn alerts_for_trade(pool: &PgPool, parent_discord_id: &str) -> anyhow::Result<Vec<Alert>> {
    let alerts = sqlx::query_as::<_, Alert>(
        "SELECT * FROM alerts WHERE trade = $1 ORDER BY timestamp",
    )
    .bind(parent_discord_id)
    .fetch_all(pool)
    .await?;
    Ok(alerts)
}
