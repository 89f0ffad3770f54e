//! Exchange-agnostic contract for perpetual-futures venues, plus the shared
//! request/response types the adapters map venue payloads into. Raw payloads
//! are carried alongside the typed views so callers can persist them verbatim.

pub mod binance;
pub mod filters;
pub mod kucoin;

pub use filters::{FilterCache, SymbolFilters};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Convenience alias for venue results.
pub type VenueResult<T> = Result<T, VenueError>;

/// Failure taxonomy for order placement and probes. Only the first five
/// variants may transition a trade to a terminal FAILED/UNFILLED state;
/// `PermissionDenied` from a status probe never overwrites a placement.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("insufficient margin: {0}")]
    MarginInsufficient(String),

    #[error("quantity out of bounds: {0}")]
    QtyOutOfBounds(String),

    #[error("notional below minimum: {0}")]
    NotionalTooSmall(String),

    #[error("stop order would immediately trigger: {0}")]
    WouldImmediatelyTrigger(String),

    #[error("symbol not supported: {0}")]
    SymbolUnsupported(String),

    #[error("price outside allowed range: {0}")]
    PriceOutOfRange(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("transient venue error: {0}")]
    Transient(String),

    #[error("venue error {code}: {message}")]
    Api { code: i64, message: String },
}

impl VenueError {
    /// True when an open_position preflight or placement failure should move
    /// the trade row to FAILED/UNFILLED.
    pub fn is_terminal_placement_failure(&self) -> bool {
        matches!(
            self,
            VenueError::MarginInsufficient(_)
                | VenueError::QtyOutOfBounds(_)
                | VenueError::NotionalTooSmall(_)
                | VenueError::WouldImmediatelyTrigger(_)
                | VenueError::SymbolUnsupported(_)
                | VenueError::PriceOutOfRange(_)
        )
    }
}

/// Parameters for a single futures order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub reduce_only: bool,
    pub close_position: bool,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: &str, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: side.into(),
            order_type: "MARKET".into(),
            quantity: Some(quantity),
            price: None,
            stop_price: None,
            reduce_only: false,
            close_position: false,
        }
    }

    pub fn limit(symbol: &str, side: &str, quantity: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: side.into(),
            order_type: "LIMIT".into(),
            quantity: Some(quantity),
            price: Some(price),
            stop_price: None,
            reduce_only: false,
            close_position: false,
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn stop_market(symbol: &str, side: &str, stop_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: side.into(),
            order_type: "STOP_MARKET".into(),
            quantity: None,
            price: None,
            stop_price: Some(stop_price),
            reduce_only: true,
            close_position: true,
        }
    }

    pub fn take_profit_market(symbol: &str, side: &str, stop_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side: side.into(),
            order_type: "TAKE_PROFIT_MARKET".into(),
            quantity: None,
            price: None,
            stop_price: Some(stop_price),
            reduce_only: true,
            close_position: true,
        }
    }
}

/// A successful placement. Success criterion is the presence of the
/// venue-assigned order id, independent of any later probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub symbol: String,
    pub status: String,
    pub executed_qty: Decimal,
    pub avg_price: Option<Decimal>,
    /// Verbatim venue payload, stored for audit.
    pub raw: Value,
}

/// A status probe result. Kept separate from the placement ack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusInfo {
    pub order_id: String,
    pub symbol: String,
    pub status: String,
    pub executed_qty: Decimal,
    pub avg_price: Option<Decimal>,
    pub raw: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    /// Signed quantity: positive long, negative short.
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrderInfo {
    pub order_id: String,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub reduce_only: bool,
    pub stop_price: Option<Decimal>,
}

impl OpenOrderInfo {
    /// Protective exit orders: reduce-only stops and take-profits.
    pub fn is_protective(&self) -> bool {
        self.reduce_only
            || matches!(
                self.order_type.as_str(),
                "STOP_MARKET" | "TAKE_PROFIT_MARKET" | "STOP" | "TAKE_PROFIT"
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTradeInfo {
    pub symbol: String,
    pub order_id: String,
    pub side: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub realized_pnl: Decimal,
    pub commission: Decimal,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeEvent {
    pub time: DateTime<Utc>,
    pub income_type: String,
    pub income: Decimal,
    pub asset: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub balance: Decimal,
    pub available: Decimal,
    pub cross_unrealized_pnl: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookTop {
    pub bid: Decimal,
    pub ask: Decimal,
}

/// REST surface a perpetual-futures venue must provide. One implementation
/// per venue; the coordinator and sync loops only ever see this trait.
#[async_trait]
pub trait FuturesVenue: Send + Sync {
    /// Short venue name used in balances/transactions rows and logs.
    fn name(&self) -> &'static str;

    /// Venue trading pair for a base coin symbol, e.g. `BTC` → `BTCUSDT`.
    fn trading_pair(&self, coin_symbol: &str) -> String;

    /// True when the pair is listed and currently trading.
    async fn is_symbol_supported(&self, symbol: &str) -> VenueResult<bool>;

    /// Lot/price/notional filters for a pair, served from the adapter cache.
    async fn symbol_filters(&self, symbol: &str) -> VenueResult<SymbolFilters>;

    async fn mark_price(&self, symbol: &str) -> VenueResult<Decimal>;

    async fn book_top(&self, symbol: &str) -> VenueResult<BookTop>;

    async fn change_leverage(&self, symbol: &str, leverage: u32) -> VenueResult<()>;

    /// Enable/disable position-mode TP/SL for a pair. Venues without the
    /// concept return `SymbolUnsupported` and callers fall back to separate
    /// reduce-only stop orders.
    async fn change_position_tpsl_mode(&self, symbol: &str, enabled: bool) -> VenueResult<()>;

    async fn place_order(&self, request: &OrderRequest) -> VenueResult<OrderAck>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> VenueResult<Value>;

    async fn cancel_all_orders(&self, symbol: &str) -> VenueResult<Value>;

    async fn order_status(&self, symbol: &str, order_id: &str) -> VenueResult<OrderStatusInfo>;

    async fn position_risk(&self, symbol: Option<&str>) -> VenueResult<Vec<PositionInfo>>;

    async fn open_orders(&self, symbol: Option<&str>) -> VenueResult<Vec<OpenOrderInfo>>;

    async fn account_trades(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> VenueResult<Vec<AccountTradeInfo>>;

    async fn income_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> VenueResult<Vec<IncomeEvent>>;

    async fn account_balances(&self) -> VenueResult<Vec<AssetBalance>>;

    async fn create_listen_key(&self) -> VenueResult<String>;

    async fn keepalive_listen_key(&self, listen_key: &str) -> VenueResult<()>;

    async fn close_listen_key(&self, listen_key: &str) -> VenueResult<()>;

    /// User-data stream URL for an acquired listen key.
    fn user_stream_url(&self, listen_key: &str) -> String;
}
