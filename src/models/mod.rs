pub mod alert;
pub mod balance;
pub mod trade;
pub mod transaction;

pub use alert::{Alert, AlertStatus};
pub use balance::Balance;
pub use trade::{ParsedSignal, TpSlOrder, Trade};
pub use transaction::IncomeRecord;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PositionType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionType {
    Long,
    Short,
}

impl PositionType {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LONG" | "BUY" => Some(PositionType::Long),
            "SHORT" | "SELL" => Some(PositionType::Short),
            _ => None,
        }
    }

    /// Order side that opens a position of this type.
    pub fn entry_side(&self) -> &'static str {
        match self {
            PositionType::Long => "BUY",
            PositionType::Short => "SELL",
        }
    }

    /// Order side that reduces a position of this type.
    pub fn exit_side(&self) -> &'static str {
        match self {
            PositionType::Long => "SELL",
            PositionType::Short => "BUY",
        }
    }
}

impl fmt::Display for PositionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionType::Long => write!(f, "LONG"),
            PositionType::Short => write!(f, "SHORT"),
        }
    }
}

// ---------------------------------------------------------------------------
// OrderKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Market,
    Limit,
}

impl OrderKind {
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MARKET" => Some(OrderKind::Market),
            "LIMIT" => Some(OrderKind::Limit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "MARKET",
            OrderKind::Limit => "LIMIT",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TradeStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Pending,
    Open,
    PartiallyClosed,
    Closed,
    Failed,
    Unfilled,
    Canceled,
    Expired,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::Open => "OPEN",
            TradeStatus::PartiallyClosed => "PARTIALLY_CLOSED",
            TradeStatus::Closed => "CLOSED",
            TradeStatus::Failed => "FAILED",
            TradeStatus::Unfilled => "UNFILLED",
            TradeStatus::Canceled => "CANCELED",
            TradeStatus::Expired => "EXPIRED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(TradeStatus::Pending),
            "OPEN" => Some(TradeStatus::Open),
            "PARTIALLY_CLOSED" => Some(TradeStatus::PartiallyClosed),
            "CLOSED" => Some(TradeStatus::Closed),
            "FAILED" => Some(TradeStatus::Failed),
            "UNFILLED" => Some(TradeStatus::Unfilled),
            "CANCELED" => Some(TradeStatus::Canceled),
            "EXPIRED" => Some(TradeStatus::Expired),
            _ => None,
        }
    }

    /// No further lifecycle transitions are possible from these states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Closed | TradeStatus::Failed | TradeStatus::Canceled | TradeStatus::Expired
        )
    }

    /// The trade has live quantity on the venue.
    pub fn has_position(&self) -> bool {
        matches!(self, TradeStatus::Open | TradeStatus::PartiallyClosed)
    }

    /// Follow-up alerts for trades in these states are acknowledged and skipped.
    pub fn skips_followups(&self) -> bool {
        matches!(
            self,
            TradeStatus::Failed
                | TradeStatus::Unfilled
                | TradeStatus::Canceled
                | TradeStatus::Expired
        )
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SignalEvent — core pipeline message from the ingress API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    pub timestamp: DateTime<Utc>,
    pub content: String,
    /// Pre-parsed pipe-delimited form, when the upstream parser supplied one.
    pub structured: Option<String>,
    pub discord_id: Option<String>,
    /// Reference to the parent trade's discord_id. Present ⇒ follow-up alert.
    pub parent_ref: Option<String>,
    pub trader: Option<String>,
}

impl SignalEvent {
    pub fn is_followup(&self) -> bool {
        self.parent_ref.as_deref().is_some_and(|r| !r.is_empty())
    }
}
