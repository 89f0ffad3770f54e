//! Scriptable in-memory venue for coordinator and sync-loop tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use sigbot::venue::{
    AccountTradeInfo, AssetBalance, BookTop, FuturesVenue, IncomeEvent, OpenOrderInfo, OrderAck,
    OrderRequest, OrderStatusInfo, PositionInfo, SymbolFilters, VenueError, VenueResult,
};

pub struct MockVenue {
    pub filters: SymbolFilters,
    pub mark: Mutex<Decimal>,
    pub positions: Mutex<Vec<PositionInfo>>,
    pub open_orders: Mutex<Vec<OpenOrderInfo>>,
    /// Account-trade history served by `account_trades`, filtered by symbol
    /// and time window.
    pub fills: Mutex<Vec<AccountTradeInfo>>,
    /// Scripted status-probe results, consumed in order. Empty ⇒ default NEW.
    pub status_script: Mutex<VecDeque<VenueResult<OrderStatusInfo>>>,
    /// Captured placement requests.
    pub placed: Mutex<Vec<OrderRequest>>,
    /// Captured (symbol, order_id) cancels.
    pub cancelled: Mutex<Vec<(String, String)>>,
    next_order_id: AtomicU64,
}

impl MockVenue {
    pub fn new(mark: &str) -> Self {
        Self {
            filters: SymbolFilters {
                step_size: Decimal::from_str("0.01").unwrap(),
                tick_size: Decimal::from_str("0.1").unwrap(),
                min_qty: Decimal::from_str("0.01").unwrap(),
                max_qty: Decimal::from_str("100000").unwrap(),
                min_notional: Decimal::from_str("5").unwrap(),
            },
            mark: Mutex::new(Decimal::from_str(mark).unwrap()),
            positions: Mutex::new(Vec::new()),
            open_orders: Mutex::new(Vec::new()),
            fills: Mutex::new(Vec::new()),
            status_script: Mutex::new(VecDeque::new()),
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            next_order_id: AtomicU64::new(1),
        }
    }

    pub fn set_position(&self, symbol: &str, amt: &str, entry: &str) {
        self.positions.lock().unwrap().push(PositionInfo {
            symbol: symbol.into(),
            position_amt: Decimal::from_str(amt).unwrap(),
            entry_price: Decimal::from_str(entry).unwrap(),
            unrealized_pnl: Decimal::ZERO,
            leverage: 1,
        });
    }

    pub fn add_open_order(&self, symbol: &str, order_id: &str, order_type: &str) {
        self.open_orders.lock().unwrap().push(OpenOrderInfo {
            order_id: order_id.into(),
            symbol: symbol.into(),
            side: "SELL".into(),
            order_type: order_type.into(),
            reduce_only: true,
            stop_price: Some(Decimal::from_str("30.7").unwrap()),
        });
    }

    pub fn script_status(&self, result: VenueResult<OrderStatusInfo>) {
        self.status_script.lock().unwrap().push_back(result);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_fill(
        &self,
        symbol: &str,
        order_id: &str,
        side: &str,
        price: &str,
        qty: &str,
        realized_pnl: &str,
        time: DateTime<Utc>,
    ) {
        self.fills.lock().unwrap().push(AccountTradeInfo {
            symbol: symbol.into(),
            order_id: order_id.into(),
            side: side.into(),
            price: Decimal::from_str(price).unwrap(),
            qty: Decimal::from_str(qty).unwrap(),
            realized_pnl: Decimal::from_str(realized_pnl).unwrap(),
            commission: Decimal::ZERO,
            time,
        });
    }

    pub fn placed_requests(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    pub fn cancelled_orders(&self) -> Vec<(String, String)> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl FuturesVenue for MockVenue {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn trading_pair(&self, coin_symbol: &str) -> String {
        format!("{}USDT", coin_symbol.to_uppercase())
    }

    async fn is_symbol_supported(&self, _symbol: &str) -> VenueResult<bool> {
        Ok(true)
    }

    async fn symbol_filters(&self, _symbol: &str) -> VenueResult<SymbolFilters> {
        Ok(self.filters)
    }

    async fn mark_price(&self, _symbol: &str) -> VenueResult<Decimal> {
        Ok(*self.mark.lock().unwrap())
    }

    async fn book_top(&self, _symbol: &str) -> VenueResult<BookTop> {
        let mark = *self.mark.lock().unwrap();
        Ok(BookTop {
            bid: mark,
            ask: mark,
        })
    }

    async fn change_leverage(&self, _symbol: &str, _leverage: u32) -> VenueResult<()> {
        Ok(())
    }

    async fn change_position_tpsl_mode(&self, _symbol: &str, _enabled: bool) -> VenueResult<()> {
        Ok(())
    }

    async fn place_order(&self, request: &OrderRequest) -> VenueResult<OrderAck> {
        let id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        let order_id = format!("mock-{id}");
        self.placed.lock().unwrap().push(request.clone());

        let mark = *self.mark.lock().unwrap();
        let (status, executed_qty, avg_price) = if request.order_type == "MARKET" {
            (
                "FILLED",
                request.quantity.unwrap_or(Decimal::ZERO),
                Some(mark),
            )
        } else {
            ("NEW", Decimal::ZERO, None)
        };

        Ok(OrderAck {
            order_id: order_id.clone(),
            symbol: request.symbol.clone(),
            status: status.into(),
            executed_qty,
            avg_price,
            raw: json!({
                "orderId": order_id,
                "symbol": request.symbol,
                "side": request.side,
                "type": request.order_type,
                "status": status,
                "executedQty": executed_qty.to_string(),
            }),
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> VenueResult<Value> {
        self.cancelled
            .lock()
            .unwrap()
            .push((symbol.to_string(), order_id.to_string()));
        Ok(json!({ "orderId": order_id, "status": "CANCELED" }))
    }

    async fn cancel_all_orders(&self, symbol: &str) -> VenueResult<Value> {
        self.cancelled
            .lock()
            .unwrap()
            .push((symbol.to_string(), "*".to_string()));
        Ok(json!({ "status": "CANCELED" }))
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> VenueResult<OrderStatusInfo> {
        if let Some(scripted) = self.status_script.lock().unwrap().pop_front() {
            return scripted;
        }
        Ok(OrderStatusInfo {
            order_id: order_id.to_string(),
            symbol: symbol.to_string(),
            status: "NEW".into(),
            executed_qty: Decimal::ZERO,
            avg_price: None,
            raw: json!({ "orderId": order_id, "status": "NEW" }),
        })
    }

    async fn position_risk(&self, symbol: Option<&str>) -> VenueResult<Vec<PositionInfo>> {
        let positions = self.positions.lock().unwrap().clone();
        Ok(match symbol {
            Some(sym) => positions.into_iter().filter(|p| p.symbol == sym).collect(),
            None => positions,
        })
    }

    async fn open_orders(&self, symbol: Option<&str>) -> VenueResult<Vec<OpenOrderInfo>> {
        let orders = self.open_orders.lock().unwrap().clone();
        Ok(match symbol {
            Some(sym) => orders.into_iter().filter(|o| o.symbol == sym).collect(),
            None => orders,
        })
    }

    async fn account_trades(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> VenueResult<Vec<AccountTradeInfo>> {
        let fills = self.fills.lock().unwrap().clone();
        Ok(fills
            .into_iter()
            .filter(|f| f.symbol == symbol && f.time >= start && f.time <= end)
            .collect())
    }

    async fn income_history(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> VenueResult<Vec<IncomeEvent>> {
        Ok(Vec::new())
    }

    async fn account_balances(&self) -> VenueResult<Vec<AssetBalance>> {
        Ok(vec![AssetBalance {
            asset: "USDT".into(),
            balance: Decimal::from(1000),
            available: Decimal::from(900),
            cross_unrealized_pnl: Decimal::ZERO,
        }])
    }

    async fn create_listen_key(&self) -> VenueResult<String> {
        Ok("mock-listen-key".into())
    }

    async fn keepalive_listen_key(&self, _listen_key: &str) -> VenueResult<()> {
        Ok(())
    }

    async fn close_listen_key(&self, _listen_key: &str) -> VenueResult<()> {
        Ok(())
    }

    fn user_stream_url(&self, listen_key: &str) -> String {
        format!("wss://mock.invalid/{listen_key}")
    }
}

#[allow(dead_code)]
pub fn permission_denied() -> VenueError {
    VenueError::PermissionDenied("Invalid API-key, IP, or permissions for action".into())
}
