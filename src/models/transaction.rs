use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database row for the transaction_history table. One venue income event,
/// deduplicated on (time, type, amount, asset, symbol).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IncomeRecord {
    pub id: i64,
    pub time: DateTime<Utc>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub income_type: String,
    pub amount: Decimal,
    pub asset: String,
    pub symbol: String,
}
