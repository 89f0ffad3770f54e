//! KuCoin Futures adapter. Same `FuturesVenue` contract as Binance; KuCoin
//! has no position-mode TP/SL toggle, so `change_position_tpsl_mode` reports
//! unsupported and callers fall back to separate reduce-only stop orders.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::filters::{FilterCache, SymbolFilters};
use super::{
    AccountTradeInfo, AssetBalance, BookTop, FuturesVenue, IncomeEvent, OpenOrderInfo, OrderAck,
    OrderRequest, OrderStatusInfo, PositionInfo, VenueError, VenueResult,
};

type HmacSha256 = Hmac<Sha256>;

const REST_BASE: &str = "https://api-futures.kucoin.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const FILTER_TTL: Duration = Duration::from_secs(3600);
const OK_CODE: &str = "200000";

pub struct KucoinFutures {
    http: Client,
    api_key: String,
    api_secret: String,
    passphrase: String,
    filters: FilterCache,
    /// Serializes outbound calls; KuCoin throttles aggressively.
    gate: Mutex<()>,
}

impl KucoinFutures {
    pub fn new(api_key: String, api_secret: String, passphrase: String) -> anyhow::Result<Self> {
        Ok(Self {
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_key,
            api_secret,
            passphrase,
            filters: FilterCache::new(FILTER_TTL),
            gate: Mutex::new(()),
        })
    }

    fn hmac_b64(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> VenueResult<Value> {
        let _gate = self.gate.lock().await;

        let timestamp = Utc::now().timestamp_millis().to_string();
        let body_text = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        let prehash = format!("{timestamp}{}{endpoint}{body_text}", method.as_str());
        let signature = self.hmac_b64(&prehash);
        let signed_passphrase = self.hmac_b64(&self.passphrase);

        let url = format!("{REST_BASE}{endpoint}");
        let mut request = self
            .http
            .request(method, &url)
            .header("KC-API-KEY", &self.api_key)
            .header("KC-API-SIGN", signature)
            .header("KC-API-TIMESTAMP", &timestamp)
            .header("KC-API-PASSPHRASE", signed_passphrase)
            .header("KC-API-KEY-VERSION", "2");
        if let Some(b) = body {
            request = request.json(&b);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| VenueError::Transient(e.to_string()))?;

        let code = payload
            .get("code")
            .and_then(|c| c.as_str())
            .unwrap_or_default();
        if code == OK_CODE {
            return Ok(payload.get("data").cloned().unwrap_or(Value::Null));
        }

        let msg = payload
            .get("msg")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_string();
        Err(match code {
            "429000" => VenueError::Transient(format!("rate limited: {msg}")),
            "300003" => VenueError::MarginInsufficient(msg),
            "100001" if msg.contains("size") => VenueError::QtyOutOfBounds(msg),
            "400100" if msg.contains("symbol") => VenueError::SymbolUnsupported(msg),
            "400003" | "400004" | "400005" => VenueError::PermissionDenied(msg),
            "404000" => VenueError::OrderNotFound(msg),
            _ if status.is_server_error() => VenueError::Transient(msg),
            _ => VenueError::Api {
                code: code.parse().unwrap_or(0),
                message: msg,
            },
        })
    }

    async fn fetch_contract(&self, symbol: &str) -> VenueResult<SymbolFilters> {
        let data = self
            .send(Method::GET, &format!("/api/v1/contracts/{symbol}"), None)
            .await?;
        if data.is_null() {
            return Err(VenueError::SymbolUnsupported(symbol.to_string()));
        }
        if data.get("status").and_then(|s| s.as_str()) != Some("Open") {
            return Err(VenueError::SymbolUnsupported(format!("{symbol} not open")));
        }
        let num = |key: &str| {
            data.get(key)
                .and_then(|v| {
                    v.as_f64()
                        .map(|f| Decimal::from_str(&f.to_string()).unwrap_or(Decimal::ZERO))
                        .or_else(|| v.as_str().map(|s| Decimal::from_str(s).unwrap_or(Decimal::ZERO)))
                })
                .unwrap_or(Decimal::ZERO)
        };
        Ok(SymbolFilters {
            step_size: num("lotSize").max(Decimal::ONE),
            tick_size: num("tickSize"),
            min_qty: num("lotSize").max(Decimal::ONE),
            max_qty: num("maxOrderQty"),
            min_notional: Decimal::ZERO,
        })
    }
}

#[async_trait]
impl FuturesVenue for KucoinFutures {
    fn name(&self) -> &'static str {
        "kucoin"
    }

    /// KuCoin uses XBT for Bitcoin and an `M` suffix for USDT perpetuals.
    fn trading_pair(&self, coin_symbol: &str) -> String {
        let base = match coin_symbol.to_uppercase().as_str() {
            "BTC" => "XBT".to_string(),
            other => other.to_string(),
        };
        format!("{base}USDTM")
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
        let fetched = self.fetch_contract(symbol).await?;
        self.filters.insert(symbol, fetched);
        Ok(fetched)
    }

    async fn mark_price(&self, symbol: &str) -> VenueResult<Decimal> {
        let data = self
            .send(
                Method::GET,
                &format!("/api/v1/mark-price/{symbol}/current"),
                None,
            )
            .await?;
        let mark = data
            .get("markPrice")
            .and_then(|v| v.as_f64())
            .and_then(|f| Decimal::from_str(&f.to_string()).ok())
            .unwrap_or(Decimal::ZERO);
        if mark <= Decimal::ZERO {
            return Err(VenueError::Transient(format!("no mark price for {symbol}")));
        }
        Ok(mark)
    }

    async fn book_top(&self, symbol: &str) -> VenueResult<BookTop> {
        let data = self
            .send(Method::GET, &format!("/api/v1/ticker?symbol={symbol}"), None)
            .await?;
        let num = |key: &str| {
            data.get(key)
                .and_then(|v| v.as_str())
                .and_then(|s| Decimal::from_str(s).ok())
                .unwrap_or(Decimal::ZERO)
        };
        Ok(BookTop {
            bid: num("bestBidPrice"),
            ask: num("bestAskPrice"),
        })
    }

    async fn change_leverage(&self, _symbol: &str, _leverage: u32) -> VenueResult<()> {
        // KuCoin binds leverage per order, not per symbol.
        Ok(())
    }

    async fn change_position_tpsl_mode(&self, symbol: &str, _enabled: bool) -> VenueResult<()> {
        Err(VenueError::SymbolUnsupported(format!(
            "{symbol}: KuCoin has no position-mode TP/SL"
        )))
    }

    async fn place_order(&self, request: &OrderRequest) -> VenueResult<OrderAck> {
        let filters = self.symbol_filters(&request.symbol).await?;

        let mut body = json!({
            "clientOid": Uuid::new_v4().to_string(),
            "symbol": request.symbol,
            "side": request.side.to_lowercase(),
            "type": if request.order_type == "LIMIT" { "limit" } else { "market" },
        });
        if let Some(qty) = request.quantity {
            body["size"] = json!(filters.quantize_qty(qty).to_string());
        }
        if let Some(price) = request.price {
            body["price"] = json!(filters.quantize_price(price).to_string());
        }
        if let Some(stop) = request.stop_price {
            // Reduce-only stop: direction depends on the exit side.
            body["stop"] = json!(if request.side == "SELL" { "down" } else { "up" });
            body["stopPrice"] = json!(filters.quantize_price(stop).to_string());
            body["stopPriceType"] = json!("MP");
            body["closeOrder"] = json!(true);
        } else if request.reduce_only {
            body["reduceOnly"] = json!(true);
        }

        let data = self.send(Method::POST, "/api/v1/orders", Some(body)).await?;
        let order_id = data
            .get("orderId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if order_id.is_empty() {
            return Err(VenueError::Api {
                code: 0,
                message: format!("placement response without orderId: {data}"),
            });
        }
        Ok(OrderAck {
            order_id,
            symbol: request.symbol.clone(),
            status: "NEW".into(),
            executed_qty: Decimal::ZERO,
            avg_price: None,
            raw: data,
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> VenueResult<Value> {
        self.send(Method::DELETE, &format!("/api/v1/orders/{order_id}"), None)
            .await
    }

    async fn cancel_all_orders(&self, symbol: &str) -> VenueResult<Value> {
        self.send(
            Method::DELETE,
            &format!("/api/v1/orders?symbol={symbol}"),
            None,
        )
        .await
    }

    async fn order_status(&self, symbol: &str, order_id: &str) -> VenueResult<OrderStatusInfo> {
        let data = self
            .send(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
            .await?;
        let dealt = data
            .get("dealSize")
            .and_then(|v| v.as_f64())
            .and_then(|f| Decimal::from_str(&f.to_string()).ok())
            .unwrap_or(Decimal::ZERO);
        let is_active = data
            .get("isActive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let cancel_exist = data
            .get("cancelExist")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let status = if is_active {
            "NEW"
        } else if cancel_exist {
            "CANCELED"
        } else if dealt > Decimal::ZERO {
            "FILLED"
        } else {
            "EXPIRED"
        };
        Ok(OrderStatusInfo {
            order_id: order_id.to_string(),
            symbol: symbol.to_string(),
            status: status.into(),
            executed_qty: dealt,
            avg_price: data
                .get("dealValue")
                .and_then(|v| v.as_f64())
                .and_then(|value| {
                    if dealt.is_zero() {
                        None
                    } else {
                        Decimal::from_str(&value.to_string())
                            .ok()
                            .map(|v| v / dealt)
                    }
                }),
            raw: data,
        })
    }

    async fn position_risk(&self, symbol: Option<&str>) -> VenueResult<Vec<PositionInfo>> {
        let data = match symbol {
            Some(sym) => {
                let row = self
                    .send(Method::GET, &format!("/api/v1/position?symbol={sym}"), None)
                    .await?;
                json!([row])
            }
            None => self.send(Method::GET, "/api/v1/positions", None).await?,
        };
        let rows = data.as_array().cloned().unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|row| !row.is_null())
            .map(|row| {
                let num = |key: &str| {
                    row.get(key)
                        .and_then(|v| v.as_f64())
                        .and_then(|f| Decimal::from_str(&f.to_string()).ok())
                        .unwrap_or(Decimal::ZERO)
                };
                PositionInfo {
                    symbol: row
                        .get("symbol")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    position_amt: num("currentQty"),
                    entry_price: num("avgEntryPrice"),
                    unrealized_pnl: num("unrealisedPnl"),
                    leverage: num("realLeverage").to_u32().unwrap_or(1),
                }
            })
            .collect())
    }

    async fn open_orders(&self, symbol: Option<&str>) -> VenueResult<Vec<OpenOrderInfo>> {
        let endpoint = match symbol {
            Some(sym) => format!("/api/v1/orders?status=active&symbol={sym}"),
            None => "/api/v1/orders?status=active".to_string(),
        };
        let data = self.send(Method::GET, &endpoint, None).await?;
        let rows = data
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .iter()
            .map(|row| {
                let text = |key: &str| {
                    row.get(key)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                OpenOrderInfo {
                    order_id: text("id"),
                    symbol: text("symbol"),
                    side: text("side").to_uppercase(),
                    order_type: text("type").to_uppercase(),
                    reduce_only: row
                        .get("reduceOnly")
                        .or_else(|| row.get("closeOrder"))
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                    stop_price: row
                        .get("stopPrice")
                        .and_then(|v| v.as_str())
                        .and_then(|s| Decimal::from_str(s).ok()),
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
        let endpoint = format!(
            "/api/v1/fills?symbol={symbol}&startAt={}&endAt={}",
            start.timestamp_millis(),
            end.timestamp_millis()
        );
        let data = self.send(Method::GET, &endpoint, None).await?;
        let rows = data
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .iter()
            .map(|row| {
                let num = |key: &str| {
                    row.get(key)
                        .and_then(|v| {
                            v.as_f64().map(|f| f.to_string()).or_else(|| {
                                v.as_str().map(|s| s.to_string())
                            })
                        })
                        .and_then(|s| Decimal::from_str(&s).ok())
                        .unwrap_or(Decimal::ZERO)
                };
                AccountTradeInfo {
                    symbol: symbol.to_string(),
                    order_id: row
                        .get("orderId")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    side: row
                        .get("side")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_uppercase(),
                    price: num("price"),
                    qty: num("size"),
                    realized_pnl: Decimal::ZERO,
                    commission: num("fee"),
                    time: DateTime::from_timestamp_millis(
                        row.get("tradeTime").and_then(|v| v.as_i64()).unwrap_or(0) / 1_000_000,
                    )
                    .unwrap_or_else(Utc::now),
                }
            })
            .collect())
    }

    async fn income_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> VenueResult<Vec<IncomeEvent>> {
        let endpoint = format!(
            "/api/v1/transaction-history?startAt={}&endAt={}",
            start.timestamp_millis(),
            end.timestamp_millis()
        );
        let data = self.send(Method::GET, &endpoint, None).await?;
        let rows = data
            .get("dataList")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .iter()
            .map(|row| IncomeEvent {
                time: DateTime::from_timestamp_millis(
                    row.get("time").and_then(|v| v.as_i64()).unwrap_or(0),
                )
                .unwrap_or_else(Utc::now),
                income_type: row
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_uppercase(),
                income: row
                    .get("amount")
                    .and_then(|v| v.as_f64())
                    .and_then(|f| Decimal::from_str(&f.to_string()).ok())
                    .unwrap_or(Decimal::ZERO),
                asset: row
                    .get("currency")
                    .and_then(|v| v.as_str())
                    .unwrap_or("USDT")
                    .to_string(),
                symbol: String::new(),
            })
            .collect())
    }

    async fn account_balances(&self) -> VenueResult<Vec<AssetBalance>> {
        let data = self
            .send(Method::GET, "/api/v1/account-overview?currency=USDT", None)
            .await?;
        let num = |key: &str| {
            data.get(key)
                .and_then(|v| v.as_f64())
                .and_then(|f| Decimal::from_str(&f.to_string()).ok())
                .unwrap_or(Decimal::ZERO)
        };
        Ok(vec![AssetBalance {
            asset: "USDT".into(),
            balance: num("accountEquity"),
            available: num("availableBalance"),
            cross_unrealized_pnl: num("unrealisedPNL"),
        }])
    }

    async fn create_listen_key(&self) -> VenueResult<String> {
        // KuCoin hands out a connect token rather than a listen key; the
        // token doubles as the key for the stream URL.
        let data = self
            .send(Method::POST, "/api/v1/bullet-private", None)
            .await?;
        let token = data
            .get("token")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if token.is_empty() {
            return Err(VenueError::Transient("empty bullet-private token".into()));
        }
        Ok(token)
    }

    async fn keepalive_listen_key(&self, _listen_key: &str) -> VenueResult<()> {
        // Connect tokens are refreshed by reconnecting; ping frames keep the
        // socket itself alive.
        Ok(())
    }

    async fn close_listen_key(&self, _listen_key: &str) -> VenueResult<()> {
        Ok(())
    }

    fn user_stream_url(&self, listen_key: &str) -> String {
        format!("wss://ws-api-futures.kucoin.com/?token={listen_key}")
    }
}
