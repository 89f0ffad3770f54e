//! Binance USDⓈ-M Futures adapter. Thin symbol-aware wrapper over the REST
//! API: HMAC-signed requests, cached symbol filters, floor quantization,
//! token-bucket rate limiting and pause-and-retry on venue throttle codes.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tokio::sync::Mutex;

use super::filters::{FilterCache, FilterViolation, SymbolFilters};
use super::{
    AccountTradeInfo, AssetBalance, BookTop, FuturesVenue, IncomeEvent, OpenOrderInfo, OrderAck,
    OrderRequest, OrderStatusInfo, PositionInfo, VenueError, VenueResult,
};

type HmacSha256 = Hmac<Sha256>;

const MAINNET_REST: &str = "https://fapi.binance.com";
const TESTNET_REST: &str = "https://testnet.binancefuture.com";
const MAINNET_WS: &str = "wss://fstream.binance.com/ws";
const TESTNET_WS: &str = "wss://stream.binancefuture.com/ws";

const RECV_WINDOW_MS: u64 = 5_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const FILTER_TTL: Duration = Duration::from_secs(3600);

/// Aggregate outbound budget across all endpoints.
const RATE_LIMIT_PER_SEC: f64 = 10.0;

const RETRY_ATTEMPTS: u32 = 3;
const THROTTLE_BASE_DELAY: Duration = Duration::from_secs(2);
const THROTTLE_MAX_DELAY: Duration = Duration::from_secs(60);

pub struct BinanceFutures {
    http: Client,
    api_key: String,
    api_secret: String,
    rest_base: String,
    ws_base: String,
    filters: FilterCache,
    bucket: Mutex<TokenBucket>,
}

impl BinanceFutures {
    pub fn new(api_key: String, api_secret: String, testnet: bool) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let (rest_base, ws_base) = if testnet {
            (TESTNET_REST, TESTNET_WS)
        } else {
            (MAINNET_REST, MAINNET_WS)
        };
        Ok(Self {
            http,
            api_key,
            api_secret,
            rest_base: rest_base.into(),
            ws_base: ws_base.into(),
            filters: FilterCache::new(FILTER_TTL),
            bucket: Mutex::new(TokenBucket::new(10, RATE_LIMIT_PER_SEC)),
        })
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn throttle(&self) {
        loop {
            {
                let mut bucket = self.bucket.lock().await;
                if bucket.try_acquire(1.0) {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Send a signed request, retrying transient failures and pausing on the
    /// venue's throttle codes (-1003/-1015) with jittered backoff.
    async fn send_signed(
        &self,
        method: Method,
        path: &str,
        params: Vec<(String, String)>,
    ) -> VenueResult<Value> {
        let mut attempt: u32 = 0;
        loop {
            match self.send_signed_once(method.clone(), path, &params).await {
                Ok(value) => return Ok(value),
                Err(VenueError::Transient(msg)) if attempt + 1 < RETRY_ATTEMPTS => {
                    attempt += 1;
                    let delay = throttle_delay(attempt);
                    tracing::warn!(
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "Transient venue error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_signed_once(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
    ) -> VenueResult<Value> {
        self.throttle().await;

        let mut query: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        query.push(format!("timestamp={}", Utc::now().timestamp_millis()));
        query.push(format!("recvWindow={RECV_WINDOW_MS}"));
        let query = query.join("&");
        let signature = self.sign(&query);
        let url = format!("{}{path}?{query}&signature={signature}", self.rest_base);

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;

        decode_response(response).await
    }

    async fn send_public(&self, path: &str, params: &[(&str, &str)]) -> VenueResult<Value> {
        self.throttle().await;
        let url = format!("{}{path}", self.rest_base);
        let response = self
            .http
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;
        decode_response(response).await
    }

    async fn fetch_symbol_filters(&self, symbol: &str) -> VenueResult<SymbolFilters> {
        let payload = self
            .send_public("/fapi/v1/exchangeInfo", &[("symbol", symbol)])
            .await?;
        let info: ExchangeInfo = serde_json::from_value(payload)
            .map_err(|e| VenueError::Transient(format!("decoding exchangeInfo: {e}")))?;
        let sym = info
            .symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| VenueError::SymbolUnsupported(symbol.to_string()))?;
        if sym.status != "TRADING" {
            return Err(VenueError::SymbolUnsupported(format!(
                "{symbol} status={}",
                sym.status
            )));
        }
        extract_filters(symbol, &sym.filters)
    }
}

fn throttle_delay(attempt: u32) -> Duration {
    let shift = attempt.min(10);
    let expo = THROTTLE_BASE_DELAY.saturating_mul(1u32 << shift);
    let capped = expo.min(THROTTLE_MAX_DELAY);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64 / 4);
    capped + Duration::from_millis(jitter_ms)
}

async fn decode_response(response: reqwest::Response) -> VenueResult<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| VenueError::Transient(e.to_string()))?;

    if status.is_success() {
        return serde_json::from_str(&body)
            .map_err(|e| VenueError::Transient(format!("decoding body: {e}")));
    }

    // Error payloads carry {"code": <i64>, "msg": <string>}.
    let (code, msg) = match serde_json::from_str::<ApiError>(&body) {
        Ok(err) => (err.code, err.msg),
        Err(_) => (0, body.clone()),
    };
    Err(map_api_error(status, code, msg))
}

fn map_api_error(status: StatusCode, code: i64, msg: String) -> VenueError {
    match code {
        -1003 | -1015 => VenueError::Transient(format!("rate limited ({code}): {msg}")),
        -2019 => VenueError::MarginInsufficient(msg),
        -1013 | -4005 => VenueError::QtyOutOfBounds(msg),
        -4164 => VenueError::NotionalTooSmall(msg),
        -2021 => VenueError::WouldImmediatelyTrigger(msg),
        -1121 | -4141 => VenueError::SymbolUnsupported(msg),
        -4131 => VenueError::PriceOutOfRange(msg),
        -2015 | -2014 => VenueError::PermissionDenied(msg),
        -2013 => VenueError::OrderNotFound(msg),
        _ if status.is_server_error() => VenueError::Transient(format!("{status}: {msg}")),
        _ => VenueError::Api { code, message: msg },
    }
}

fn parse_dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or(Decimal::ZERO)
}

fn value_dec(value: &Value, key: &str) -> Decimal {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(parse_dec)
        .unwrap_or(Decimal::ZERO)
}

fn value_str(value: &Value, key: &str) -> String {
    value
        .get(key)
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

fn extract_filters(symbol: &str, filters: &[Value]) -> VenueResult<SymbolFilters> {
    let mut step = None;
    let mut tick = None;
    let mut min_qty = None;
    let mut max_qty = None;
    let mut min_notional = None;

    for f in filters {
        match f.get("filterType").and_then(|t| t.as_str()) {
            Some("LOT_SIZE") => {
                step = Some(value_dec(f, "stepSize"));
                min_qty = Some(value_dec(f, "minQty"));
                max_qty = Some(value_dec(f, "maxQty"));
            }
            Some("PRICE_FILTER") => tick = Some(value_dec(f, "tickSize")),
            Some("MIN_NOTIONAL") => min_notional = Some(value_dec(f, "notional")),
            _ => {}
        }
    }

    match (step, tick) {
        (Some(step_size), Some(tick_size)) if step_size > Decimal::ZERO => Ok(SymbolFilters {
            step_size,
            tick_size,
            min_qty: min_qty.unwrap_or(Decimal::ZERO),
            max_qty: max_qty.unwrap_or(Decimal::ZERO),
            min_notional: min_notional.unwrap_or(Decimal::ZERO),
        }),
        _ => Err(VenueError::Transient(format!(
            "incomplete filters for {symbol}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    #[serde(default)]
    symbols: Vec<ExchangeSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeSymbol {
    symbol: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    filters: Vec<Value>,
}

#[async_trait]
impl FuturesVenue for BinanceFutures {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn trading_pair(&self, coin_symbol: &str) -> String {
        format!("{}USDT", coin_symbol.to_uppercase())
    }

    async fn is_symbol_supported(&self, symbol: &str) -> VenueResult<bool> {
        match self.symbol_filters(symbol).await {
            Ok(_) => Ok(true),
            Err(VenueError::SymbolUnsupported(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn symbol_filters(&self, symbol: &str) -> VenueResult<SymbolFilters> {
        if let Some(filters) = self.filters.get(symbol) {
            return Ok(filters);
        }
        let fetched = self.fetch_symbol_filters(symbol).await?;
        self.filters.insert(symbol, fetched);
        Ok(fetched)
    }

    async fn mark_price(&self, symbol: &str) -> VenueResult<Decimal> {
        let payload = self
            .send_public("/fapi/v1/premiumIndex", &[("symbol", symbol)])
            .await?;
        let mark = value_dec(&payload, "markPrice");
        if mark <= Decimal::ZERO {
            return Err(VenueError::Transient(format!(
                "no mark price for {symbol}"
            )));
        }
        Ok(mark)
    }

    async fn book_top(&self, symbol: &str) -> VenueResult<BookTop> {
        let payload = self
            .send_public("/fapi/v1/ticker/bookTicker", &[("symbol", symbol)])
            .await?;
        Ok(BookTop {
            bid: value_dec(&payload, "bidPrice"),
            ask: value_dec(&payload, "askPrice"),
        })
    }

    async fn change_leverage(&self, symbol: &str, leverage: u32) -> VenueResult<()> {
        self.send_signed(
            Method::POST,
            "/fapi/v1/leverage",
            vec![
                ("symbol".into(), symbol.into()),
                ("leverage".into(), leverage.to_string()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn change_position_tpsl_mode(&self, _symbol: &str, _enabled: bool) -> VenueResult<()> {
        // Binance expresses position-mode TP/SL as closePosition=true stop
        // orders; nothing to toggle ahead of placement.
        Ok(())
    }

    async fn place_order(&self, request: &OrderRequest) -> VenueResult<OrderAck> {
        // Validate and quantize against cached filters before touching the
        // order endpoint. Unknown symbols refresh the cache eagerly.
        let filters = match self.symbol_filters(&request.symbol).await {
            Ok(f) => f,
            Err(VenueError::SymbolUnsupported(_)) => {
                self.filters.invalidate(&request.symbol);
                self.fetch_symbol_filters(&request.symbol).await?
            }
            Err(err) => return Err(err),
        };

        let mut params: Vec<(String, String)> = vec![
            ("symbol".into(), request.symbol.clone()),
            ("side".into(), request.side.clone()),
            ("type".into(), request.order_type.clone()),
        ];

        let mut reference_price = request.price;
        if let Some(price) = request.price {
            let quantized = filters.quantize_price(price);
            reference_price = Some(quantized);
            params.push(("price".into(), quantized.to_string()));
            params.push(("timeInForce".into(), "GTC".into()));
        }
        if let Some(stop) = request.stop_price {
            params.push(("stopPrice".into(), filters.quantize_price(stop).to_string()));
        }
        if let Some(qty) = request.quantity {
            let quantized = filters.quantize_qty(qty);
            if let Some(price) = reference_price {
                filters.validate(quantized, price).map_err(|v| match v {
                    FilterViolation::BelowMinNotional { .. } => {
                        VenueError::NotionalTooSmall(v.to_string())
                    }
                    _ => VenueError::QtyOutOfBounds(v.to_string()),
                })?;
            } else if quantized < filters.min_qty {
                return Err(VenueError::QtyOutOfBounds(format!(
                    "quantity {quantized} below minQty {}",
                    filters.min_qty
                )));
            }
            params.push(("quantity".into(), quantized.to_string()));
        }
        if request.close_position {
            params.push(("closePosition".into(), "true".into()));
        } else if request.reduce_only {
            params.push(("reduceOnly".into(), "true".into()));
        }

        let payload = self
            .send_signed(Method::POST, "/fapi/v1/order", params)
            .await?;

        let order_id = value_str(&payload, "orderId");
        if order_id.is_empty() {
            return Err(VenueError::Api {
                code: 0,
                message: format!("placement response without orderId: {payload}"),
            });
        }

        let avg_price = value_dec(&payload, "avgPrice");
        Ok(OrderAck {
            order_id,
            symbol: request.symbol.clone(),
            status: value_str(&payload, "status"),
            executed_qty: value_dec(&payload, "executedQty"),
            avg_price: (avg_price > Decimal::ZERO).then_some(avg_price),
            raw: payload,
        })
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> VenueResult<Value> {
        self.send_signed(
            Method::DELETE,
            "/fapi/v1/order",
            vec![
                ("symbol".into(), symbol.into()),
                ("orderId".into(), order_id.into()),
            ],
        )
        .await
    }

    async fn cancel_all_orders(&self, symbol: &str) -> VenueResult<Value> {
        self.send_signed(
            Method::DELETE,
            "/fapi/v1/allOpenOrders",
            vec![("symbol".into(), symbol.into())],
        )
        .await
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> VenueResult<OrderStatusInfo> {
        let payload = self
            .send_signed(
                Method::GET,
                "/fapi/v1/order",
                vec![
                    ("symbol".into(), symbol.into()),
                    ("orderId".into(), order_id.into()),
                ],
            )
            .await?;

        let avg_price = value_dec(&payload, "avgPrice");
        Ok(OrderStatusInfo {
            order_id: value_str(&payload, "orderId"),
            symbol: symbol.to_string(),
            status: value_str(&payload, "status"),
            executed_qty: value_dec(&payload, "executedQty"),
            avg_price: (avg_price > Decimal::ZERO).then_some(avg_price),
            raw: payload,
        })
    }

    async fn position_risk(&self, symbol: Option<&str>) -> VenueResult<Vec<PositionInfo>> {
        let mut params = Vec::new();
        if let Some(sym) = symbol {
            params.push(("symbol".to_string(), sym.to_string()));
        }
        let payload = self
            .send_signed(Method::GET, "/fapi/v2/positionRisk", params)
            .await?;
        let rows = payload.as_array().cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .map(|row| PositionInfo {
                symbol: value_str(row, "symbol"),
                position_amt: value_dec(row, "positionAmt"),
                entry_price: value_dec(row, "entryPrice"),
                unrealized_pnl: value_dec(row, "unRealizedProfit"),
                leverage: value_str(row, "leverage").parse().unwrap_or(1),
            })
            .collect())
    }

    async fn open_orders(&self, symbol: Option<&str>) -> VenueResult<Vec<OpenOrderInfo>> {
        let mut params = Vec::new();
        if let Some(sym) = symbol {
            params.push(("symbol".to_string(), sym.to_string()));
        }
        let payload = self
            .send_signed(Method::GET, "/fapi/v1/openOrders", params)
            .await?;
        let rows = payload.as_array().cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .map(|row| {
                let stop = value_dec(row, "stopPrice");
                OpenOrderInfo {
                    order_id: value_str(row, "orderId"),
                    symbol: value_str(row, "symbol"),
                    side: value_str(row, "side"),
                    order_type: value_str(row, "type"),
                    reduce_only: row
                        .get("reduceOnly")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                    stop_price: (stop > Decimal::ZERO).then_some(stop),
                }
            })
            .collect())
    }

    async fn account_trades(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> VenueResult<Vec<AccountTradeInfo>> {
        let payload = self
            .send_signed(
                Method::GET,
                "/fapi/v1/userTrades",
                vec![
                    ("symbol".into(), symbol.into()),
                    ("startTime".into(), start.timestamp_millis().to_string()),
                    ("endTime".into(), end.timestamp_millis().to_string()),
                    ("limit".into(), "1000".into()),
                ],
            )
            .await?;
        let rows = payload.as_array().cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .map(|row| AccountTradeInfo {
                symbol: value_str(row, "symbol"),
                order_id: value_str(row, "orderId"),
                side: value_str(row, "side"),
                price: value_dec(row, "price"),
                qty: value_dec(row, "qty"),
                realized_pnl: value_dec(row, "realizedPnl"),
                commission: value_dec(row, "commission"),
                time: millis_to_utc(row.get("time").and_then(|v| v.as_i64()).unwrap_or(0)),
            })
            .collect())
    }

    async fn income_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> VenueResult<Vec<IncomeEvent>> {
        let payload = self
            .send_signed(
                Method::GET,
                "/fapi/v1/income",
                vec![
                    ("startTime".into(), start.timestamp_millis().to_string()),
                    ("endTime".into(), end.timestamp_millis().to_string()),
                    ("limit".into(), "1000".into()),
                ],
            )
            .await?;
        let rows = payload.as_array().cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .map(|row| IncomeEvent {
                time: millis_to_utc(row.get("time").and_then(|v| v.as_i64()).unwrap_or(0)),
                income_type: value_str(row, "incomeType"),
                income: value_dec(row, "income"),
                asset: value_str(row, "asset"),
                symbol: value_str(row, "symbol"),
            })
            .collect())
    }

    async fn account_balances(&self) -> VenueResult<Vec<AssetBalance>> {
        let payload = self
            .send_signed(Method::GET, "/fapi/v2/balance", Vec::new())
            .await?;
        let rows = payload.as_array().cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .map(|row| AssetBalance {
                asset: value_str(row, "asset"),
                balance: value_dec(row, "balance"),
                available: value_dec(row, "availableBalance"),
                cross_unrealized_pnl: value_dec(row, "crossUnPnl"),
            })
            .collect())
    }

    async fn create_listen_key(&self) -> VenueResult<String> {
        self.throttle().await;
        let url = format!("{}/fapi/v1/listenKey", self.rest_base);
        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;
        let payload = decode_response(response).await?;
        let key = value_str(&payload, "listenKey");
        if key.is_empty() {
            return Err(VenueError::Transient("empty listenKey response".into()));
        }
        Ok(key)
    }

    async fn keepalive_listen_key(&self, listen_key: &str) -> VenueResult<()> {
        self.throttle().await;
        let url = format!("{}/fapi/v1/listenKey", self.rest_base);
        let response = self
            .http
            .put(&url)
            .query(&[("listenKey", listen_key)])
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;
        decode_response(response).await?;
        Ok(())
    }

    async fn close_listen_key(&self, listen_key: &str) -> VenueResult<()> {
        self.throttle().await;
        let url = format!("{}/fapi/v1/listenKey", self.rest_base);
        let response = self
            .http
            .delete(&url)
            .query(&[("listenKey", listen_key)])
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;
        decode_response(response).await?;
        Ok(())
    }

    fn user_stream_url(&self, listen_key: &str) -> String {
        format!("{}/{listen_key}", self.ws_base)
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

/// Token-bucket limiter for outbound venue calls.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: std::time::Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = capacity as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: std::time::Instant::now(),
        }
    }

    fn try_acquire(&mut self, tokens: f64) -> bool {
        self.refill();
        if self.tokens >= tokens {
            self.tokens -= tokens;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = std::time::Instant::now();
        let elapsed = now
            .checked_duration_since(self.last_refill)
            .unwrap_or_default();
        let to_add = elapsed.as_secs_f64() * self.refill_per_sec;
        if to_add > 0.0 {
            self.tokens = (self.tokens + to_add).min(self.capacity);
            self.last_refill = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> BinanceFutures {
        BinanceFutures::new("key".into(), "secret".into(), true).unwrap()
    }

    #[test]
    fn signature_is_hex_sha256() {
        let c = client();
        let sig = c.sign("symbol=BTCUSDT&timestamp=1700000000000");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn trading_pair_appends_usdt() {
        assert_eq!(client().trading_pair("hype"), "HYPEUSDT");
    }

    #[test]
    fn rate_limit_maps_to_transient() {
        let err = map_api_error(StatusCode::TOO_MANY_REQUESTS, -1003, "slow down".into());
        assert!(matches!(err, VenueError::Transient(_)));
    }

    #[test]
    fn probe_permission_error_maps_to_permission_denied() {
        let err = map_api_error(StatusCode::UNAUTHORIZED, -2015, "Invalid API-key".into());
        assert!(matches!(err, VenueError::PermissionDenied(_)));
        assert!(!err.is_terminal_placement_failure());
    }

    #[test]
    fn margin_error_is_terminal() {
        let err = map_api_error(StatusCode::BAD_REQUEST, -2019, "Margin is insufficient".into());
        assert!(err.is_terminal_placement_failure());
    }

    #[test]
    fn unknown_order_maps_to_not_found() {
        let err = map_api_error(StatusCode::BAD_REQUEST, -2013, "Order does not exist".into());
        assert!(matches!(err, VenueError::OrderNotFound(_)));
    }

    #[test]
    fn extract_filters_reads_lot_price_notional() {
        let raw = serde_json::json!([
            {"filterType": "LOT_SIZE", "stepSize": "0.01", "minQty": "0.01", "maxQty": "10000"},
            {"filterType": "PRICE_FILTER", "tickSize": "0.10"},
            {"filterType": "MIN_NOTIONAL", "notional": "5"}
        ]);
        let filters = extract_filters("HYPEUSDT", raw.as_array().unwrap()).unwrap();
        assert_eq!(filters.step_size, Decimal::new(1, 2));
        assert_eq!(filters.tick_size, Decimal::new(10, 2));
        assert_eq!(filters.min_notional, Decimal::from(5));
    }

    #[test]
    fn token_bucket_enforces_capacity() {
        // No refill: the bucket must reject once capacity is spent.
        let mut bucket = TokenBucket::new(2, 0.0);
        assert!(bucket.try_acquire(1.0));
        assert!(bucket.try_acquire(1.0));
        assert!(!bucket.try_acquire(1.0));
    }
}
