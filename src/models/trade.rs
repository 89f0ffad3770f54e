use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use super::{OrderKind, PositionType, TradeStatus};

/// Database row for the trades table. One row per initial signal; the row
/// tracks the full position lifecycle from PENDING to a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trade {
    pub id: i64,
    pub discord_id: String,
    pub timestamp: DateTime<Utc>,
    pub coin_symbol: Option<String>,
    pub parsed_signal: Option<Value>,
    pub signal_type: Option<String>,
    pub status: String,
    pub position_type: Option<String>,
    pub order_type: Option<String>,
    pub entry_price: Option<Decimal>,
    /// Effective fill price reported by the venue, kept separate from the
    /// signal's requested entry.
    pub binance_entry_price: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub position_size: Option<Decimal>,
    pub exchange_order_id: Option<String>,
    /// First successful placement payload. Write-once.
    pub original_order_response: Option<Value>,
    /// Latest venue payload of any kind.
    pub binance_response: Option<Value>,
    /// Latest status-probe payload. Never merged into the placement record.
    pub order_status_response: Option<Value>,
    pub tp_sl_orders: Value,
    pub pnl_usd: Option<Decimal>,
    pub sync_error_count: i32,
    pub sync_issues: Value,
    pub manual_verification_needed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub merged_into_trade_id: Option<i64>,
    pub merge_reason: Option<String>,
    pub merged_at: Option<DateTime<Utc>>,
}

impl Trade {
    pub fn status(&self) -> TradeStatus {
        TradeStatus::from_db_str(&self.status).unwrap_or(TradeStatus::Pending)
    }

    pub fn position_type(&self) -> Option<PositionType> {
        self.position_type.as_deref().and_then(PositionType::from_api_str)
    }

    pub fn parsed_signal(&self) -> Option<ParsedSignal> {
        self.parsed_signal
            .clone()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    pub fn tp_sl_orders(&self) -> Vec<TpSlOrder> {
        serde_json::from_value(self.tp_sl_orders.clone()).unwrap_or_default()
    }

    /// Entry price to use for breakeven math: venue fill price when known,
    /// otherwise the signal's requested entry.
    pub fn effective_entry_price(&self) -> Option<Decimal> {
        self.binance_entry_price.or(self.entry_price)
    }
}

/// Structured trade idea produced by the signal parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSignal {
    pub coin_symbol: String,
    pub position_type: PositionType,
    /// One value, or two for an entry range.
    pub entry_prices: Vec<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profits: Vec<Decimal>,
    pub order_type: OrderKind,
    /// Quantity scale for small-price coins. Always ≥ 1.
    pub quantity_multiplier: Option<u32>,
}

impl ParsedSignal {
    /// The price submitted for a LIMIT entry. For a range the aggressive
    /// bound is used: upper for LONG, lower for SHORT.
    pub fn limit_entry_price(&self) -> Option<Decimal> {
        match self.entry_prices.as_slice() {
            [] => None,
            [single] => Some(*single),
            prices => {
                let (min, max) = prices.iter().fold((prices[0], prices[0]), |(lo, hi), p| {
                    (lo.min(*p), hi.max(*p))
                });
                Some(match self.position_type {
                    PositionType::Long => max,
                    PositionType::Short => min,
                })
            }
        }
    }
}

/// One protective order attached to a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TpSlOrder {
    pub order_id: String,
    pub kind: ProtectiveKind,
    pub trigger_price: Decimal,
    /// Take-profit level (1, 2, …) when the signal carried several targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProtectiveKind {
    Tp,
    Sl,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn signal(position_type: PositionType, entries: &[&str]) -> ParsedSignal {
        ParsedSignal {
            coin_symbol: "HYPE".into(),
            position_type,
            entry_prices: entries.iter().map(|p| p.parse().unwrap()).collect(),
            stop_loss: None,
            take_profits: vec![],
            order_type: OrderKind::Limit,
            quantity_multiplier: None,
        }
    }

    #[test]
    fn long_range_uses_upper_bound() {
        let s = signal(PositionType::Long, &["32.2", "31.5"]);
        assert_eq!(s.limit_entry_price(), Some(Decimal::new(322, 1)));
    }

    #[test]
    fn short_range_uses_lower_bound() {
        let s = signal(PositionType::Short, &["32.2", "31.5"]);
        assert_eq!(s.limit_entry_price(), Some(Decimal::new(315, 1)));
    }

    #[test]
    fn single_entry_passthrough() {
        let s = signal(PositionType::Long, &["100"]);
        assert_eq!(s.limit_entry_price(), Some(Decimal::from(100)));
    }

    #[test]
    fn no_entries_yields_none() {
        let s = signal(PositionType::Long, &[]);
        assert_eq!(s.limit_entry_price(), None);
    }
}
