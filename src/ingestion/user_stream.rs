//! User-data stream ingestor. One long-lived WebSocket session per API key,
//! consumed by a single worker so per-connection delivery order is preserved
//! all the way into the row updates.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use rand::Rng;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::db::{balance_repo, trade_repo};
use crate::models::TradeStatus;
use crate::venue::FuturesVenue;

const BASE_RECONNECT_DELAY: Duration = Duration::from_secs(2);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(600);
/// Venue-enforced maximum connection lifetime.
const ROTATE_AFTER: Duration = Duration::from_secs(24 * 3600);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30 * 60);
/// Pending row updates before the ingestor stops reading the socket.
const PERSIST_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(180),
            pong_timeout: Duration::from_secs(600),
            max_reconnect_attempts: 10,
        }
    }
}

/// Shared connection state surfaced by `GET /websocket/status`.
#[derive(Default)]
pub struct StreamStatus {
    pub connected: AtomicBool,
    pub last_event_ms: AtomicI64,
    pub reconnects: AtomicI64,
}

impl StreamStatus {
    fn mark_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    fn mark_event(&self) {
        self.last_event_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

/// One parsed order/trade update handed to the persistence worker.
#[derive(Debug)]
struct ExecutionUpdate {
    order_id: String,
    status: String,
    reduce_only: bool,
    cumulative_qty: Decimal,
    avg_price: Decimal,
    realized_pnl: Decimal,
    event_time: DateTime<Utc>,
}

/// Run the stream until cancelled. Reconnects with jittered exponential
/// backoff; after `max_reconnect_attempts` consecutive failures it asks the
/// synchronizer for a snapshot reconciliation instead of replaying events.
pub async fn run_user_stream(
    venue: Arc<dyn FuturesVenue>,
    pool: PgPool,
    config: StreamConfig,
    status: Arc<StreamStatus>,
    sync_trigger: mpsc::Sender<&'static str>,
) {
    // Bounded persistence queue: a full queue pauses socket reads, the venue
    // eventually disconnects, and reconnection reconciles via snapshot.
    let (update_tx, mut update_rx) = mpsc::channel::<ExecutionUpdate>(PERSIST_QUEUE_DEPTH);
    let persist_pool = pool.clone();
    tokio::spawn(async move {
        while let Some(update) = update_rx.recv().await {
            if let Err(e) = apply_execution_update(&persist_pool, &update).await {
                tracing::error!(order_id = %update.order_id, error = %e, "Failed to apply execution update");
            }
        }
    });

    let mut attempt: u32 = 0;
    loop {
        let listen_key = match venue.create_listen_key().await {
            Ok(key) => key,
            Err(e) => {
                tracing::error!(error = %e, "Failed to acquire listen key");
                attempt = attempt.saturating_add(1);
                if attempt >= config.max_reconnect_attempts {
                    request_snapshot(&sync_trigger, status.as_ref(), &mut attempt).await;
                }
                sleep(reconnect_delay(attempt)).await;
                continue;
            }
        };

        let url = venue.user_stream_url(&listen_key);
        tracing::info!(venue = venue.name(), "Connecting to user-data stream...");

        match connect_async(&url).await {
            Ok((ws_stream, _response)) => {
                tracing::info!("User-data stream connected");
                status.mark_connected(true);
                attempt = 0;

                let (mut write, mut read) = ws_stream.split();
                let connected_at = Instant::now();
                let mut last_pong = Instant::now();

                let mut ping_timer = interval(config.ping_interval);
                ping_timer.tick().await; // consume the immediate tick
                let mut keepalive_timer = interval(KEEPALIVE_INTERVAL);
                keepalive_timer.tick().await;

                loop {
                    // Rotate before the venue force-closes at 24h.
                    if connected_at.elapsed() >= ROTATE_AFTER {
                        tracing::info!("Rotating user-data stream connection");
                        break;
                    }

                    tokio::select! {
                        msg = read.next() => {
                            match msg {
                                Some(Ok(Message::Text(text))) => {
                                    status.mark_event();
                                    handle_text_event(text.as_ref(), &pool, &update_tx).await;
                                }
                                Some(Ok(Message::Ping(data))) => {
                                    if write.send(Message::Pong(data)).await.is_err() {
                                        break;
                                    }
                                }
                                Some(Ok(Message::Pong(_))) => {
                                    last_pong = Instant::now();
                                }
                                Some(Ok(Message::Close(_))) => {
                                    tracing::warn!("Server closed user-data stream");
                                    break;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::error!(error = %e, "User-data stream read error");
                                    break;
                                }
                                None => {
                                    tracing::warn!("User-data stream ended");
                                    break;
                                }
                            }
                        }
                        _ = ping_timer.tick() => {
                            if last_pong.elapsed() >= config.pong_timeout {
                                tracing::warn!("No pong within timeout — reconnecting");
                                break;
                            }
                            if write.send(Message::Ping(vec![].into())).await.is_err() {
                                break;
                            }
                        }
                        _ = keepalive_timer.tick() => {
                            if let Err(e) = venue.keepalive_listen_key(&listen_key).await {
                                tracing::warn!(error = %e, "Listen-key keepalive failed");
                            }
                        }
                    }
                }

                status.mark_connected(false);
                status.reconnects.fetch_add(1, Ordering::Relaxed);
                let _ = venue.close_listen_key(&listen_key).await;
                // Missed events are reconciled from a snapshot, not replayed.
                let _ = sync_trigger.try_send("status_sync");
            }
            Err(e) => {
                tracing::error!(error = %e, "User-data stream connection failed");
                status.mark_connected(false);
            }
        }

        attempt = attempt.saturating_add(1);
        if attempt >= config.max_reconnect_attempts {
            request_snapshot(&sync_trigger, status.as_ref(), &mut attempt).await;
        }
        let delay = reconnect_delay(attempt);
        tracing::info!(delay_secs = delay.as_secs(), attempt, "Reconnecting user-data stream...");
        sleep(delay).await;
    }
}

async fn request_snapshot(
    sync_trigger: &mpsc::Sender<&'static str>,
    status: &StreamStatus,
    attempt: &mut u32,
) {
    tracing::warn!("Reconnect budget exhausted — requesting snapshot reconciliation");
    status.mark_connected(false);
    let _ = sync_trigger.send("status_sync").await;
    *attempt = 0;
}

/// `2, 4, 8, … 600s` with jitter.
fn reconnect_delay(attempt: u32) -> Duration {
    let shift = attempt.min(10);
    let expo = BASE_RECONNECT_DELAY.saturating_mul(1u32 << shift);
    let capped = expo.min(MAX_RECONNECT_DELAY);
    let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4);
    capped + Duration::from_millis(jitter_ms)
}

async fn handle_text_event(text: &str, pool: &PgPool, update_tx: &mpsc::Sender<ExecutionUpdate>) {
    let Ok(event) = serde_json::from_str::<Value>(text) else {
        tracing::trace!(raw = %text, "Non-JSON stream message");
        return;
    };

    match event.get("e").and_then(|e| e.as_str()) {
        Some("ORDER_TRADE_UPDATE") => {
            counter!("stream_order_updates").increment(1);
            if let Some(update) = parse_order_update(&event) {
                // A full queue blocks here, which pauses socket reads.
                if update_tx.send(update).await.is_err() {
                    tracing::error!("Persistence queue closed");
                }
            }
        }
        Some("ACCOUNT_UPDATE") => {
            counter!("stream_account_updates").increment(1);
            apply_account_update(pool, &event).await;
        }
        Some("listenKeyExpired") => {
            tracing::warn!("Listen key expired event received");
        }
        _ => {}
    }
}

fn parse_order_update(event: &Value) -> Option<ExecutionUpdate> {
    let order = event.get("o")?;
    let dec = |key: &str| {
        order
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok())
            .unwrap_or(Decimal::ZERO)
    };
    let order_id = match order.get("i") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => return None,
    };
    let event_time = event
        .get("E")
        .and_then(|v| v.as_i64())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    Some(ExecutionUpdate {
        order_id,
        status: order
            .get("X")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        reduce_only: order.get("R").and_then(|v| v.as_bool()).unwrap_or(false),
        cumulative_qty: dec("z"),
        avg_price: dec("ap"),
        realized_pnl: dec("rp"),
        event_time,
    })
}

/// Apply one ordered execution report to its trade row. Timestamps are
/// check-and-set against null and never overwritten.
async fn apply_execution_update(pool: &PgPool, update: &ExecutionUpdate) -> anyhow::Result<()> {
    // Resolve by entry order id first (including the payload scan), then by
    // protective order id.
    let (trade, via_protective) =
        match trade_repo::find_by_exchange_order_id(pool, &update.order_id).await? {
            Some(trade) => (trade, false),
            None => match trade_repo::find_by_protective_order_id(pool, &update.order_id).await? {
                Some(trade) => (trade, true),
                None => {
                    tracing::debug!(order_id = %update.order_id, "Execution report for unknown order");
                    return Ok(());
                }
            },
        };

    let is_exit = via_protective || update.reduce_only;
    match (update.status.as_str(), is_exit) {
        ("FILLED", false) => {
            trade_repo::apply_entry_fill(
                pool,
                trade.id,
                update.avg_price,
                update.cumulative_qty,
                update.event_time,
            )
            .await?;
            tracing::info!(trade_id = trade.id, price = %update.avg_price, "Entry filled");
        }
        ("FILLED", true) | ("PARTIALLY_FILLED", true) => {
            let held = trade.position_size.unwrap_or(Decimal::ZERO);
            let remaining = (held - update.cumulative_qty).max(Decimal::ZERO);
            let full_close = update.status == "FILLED" && remaining.is_zero();
            let status = if full_close {
                TradeStatus::Closed
            } else {
                TradeStatus::PartiallyClosed
            };
            let pnl = (!update.realized_pnl.is_zero()).then_some(update.realized_pnl);
            trade_repo::record_close(
                pool,
                trade.id,
                status,
                Some(update.avg_price),
                pnl,
                remaining,
                Some(update.event_time),
            )
            .await?;
            tracing::info!(
                trade_id = trade.id,
                status = %status,
                exit = %update.avg_price,
                "Exit fill applied"
            );
        }
        ("CANCELED", false) if update.cumulative_qty.is_zero() => {
            trade_repo::apply_terminal_no_fill(pool, trade.id, TradeStatus::Canceled).await?;
        }
        ("EXPIRED", false) if update.cumulative_qty.is_zero() => {
            trade_repo::apply_terminal_no_fill(pool, trade.id, TradeStatus::Expired).await?;
        }
        _ => {
            tracing::debug!(
                trade_id = trade.id,
                status = %update.status,
                is_exit,
                "Ignoring execution report state"
            );
        }
    }
    Ok(())
}

/// Balance deltas arrive on the same stream; reflect them in the balances
/// table between full syncs.
async fn apply_account_update(pool: &PgPool, event: &Value) {
    let Some(balances) = event
        .get("a")
        .and_then(|a| a.get("B"))
        .and_then(|b| b.as_array())
    else {
        return;
    };
    for entry in balances {
        let asset = entry.get("a").and_then(|v| v.as_str()).unwrap_or_default();
        if asset.is_empty() {
            continue;
        }
        let wallet = entry
            .get("wb")
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok())
            .unwrap_or(Decimal::ZERO);
        let cross = entry
            .get("cw")
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok())
            .unwrap_or(wallet);
        if let Err(e) = balance_repo::upsert_balance(
            pool,
            "binance",
            "futures",
            asset,
            cross,
            (wallet - cross).max(Decimal::ZERO),
            wallet,
            Decimal::ZERO,
        )
        .await
        {
            tracing::warn!(asset, error = %e, "Failed to upsert streamed balance");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn order_update_parses_core_fields() {
        let event = json!({
            "e": "ORDER_TRADE_UPDATE",
            "E": 1700000000123i64,
            "o": {
                "s": "HYPEUSDT",
                "i": 123456,
                "X": "FILLED",
                "R": false,
                "z": "3.17",
                "ap": "32.2",
                "rp": "0"
            }
        });
        let update = parse_order_update(&event).unwrap();
        assert_eq!(update.order_id, "123456");
        assert_eq!(update.status, "FILLED");
        assert!(!update.reduce_only);
        assert_eq!(update.cumulative_qty, Decimal::from_str("3.17").unwrap());
        assert_eq!(update.avg_price, Decimal::from_str("32.2").unwrap());
        assert_eq!(update.event_time.timestamp_millis(), 1700000000123);
    }

    #[test]
    fn order_update_without_order_block_is_skipped() {
        assert!(parse_order_update(&json!({"e": "ORDER_TRADE_UPDATE"})).is_none());
    }

    #[test]
    fn reconnect_delay_is_capped() {
        for attempt in 0..20 {
            let delay = reconnect_delay(attempt);
            assert!(delay <= MAX_RECONNECT_DELAY + MAX_RECONNECT_DELAY / 4);
        }
    }

    #[test]
    fn reconnect_delay_grows_exponentially() {
        assert!(reconnect_delay(0) >= Duration::from_secs(2));
        assert!(reconnect_delay(3) >= Duration::from_secs(16));
    }
}
