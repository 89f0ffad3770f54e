//! Status reconciliation: probe the venue for every open trade and apply
//! the same transitions the event ingestor would. A probe failure only
//! bumps `sync_error_count` — it never overwrites a successful placement.

use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::db::trade_repo;
use crate::models::TradeStatus;
use crate::venue::{FuturesVenue, VenueError};

/// Trades older than this are left to manual review instead of being probed
/// forever.
const MAX_TRADE_AGE_HOURS: i64 = 120;
/// One probe per second keeps this loop inside the venue's request budget.
const PROBE_SPACING: Duration = Duration::from_secs(1);

pub async fn run(pool: &PgPool, venue: &dyn FuturesVenue) -> anyhow::Result<Value> {
    let trades = trade_repo::open_trades_younger_than(pool, MAX_TRADE_AGE_HOURS).await?;
    let mut probed = 0usize;
    let mut transitioned = 0usize;
    let mut errors = 0usize;

    for trade in &trades {
        let (Some(coin_symbol), Some(order_id)) =
            (trade.coin_symbol.as_deref(), trade.exchange_order_id.as_deref())
        else {
            continue;
        };
        let pair = venue.trading_pair(coin_symbol);
        probed += 1;

        match venue.order_status(&pair, order_id).await {
            Ok(info) => {
                trade_repo::record_status_probe(pool, trade.id, &info.raw).await?;
                if apply_probe(pool, trade.id, trade.position_size, &info.status, info.executed_qty, info.avg_price)
                    .await?
                {
                    transitioned += 1;
                }
            }
            Err(VenueError::OrderNotFound(_)) => {
                // The venue no longer knows the order: it filled and closed
                // earlier than our records show.
                trade_repo::record_close(
                    pool,
                    trade.id,
                    TradeStatus::Closed,
                    None,
                    None,
                    Decimal::ZERO,
                    Some(chrono::Utc::now()),
                )
                .await?;
                transitioned += 1;
            }
            Err(e) => {
                errors += 1;
                trade_repo::increment_sync_error(
                    pool,
                    trade.id,
                    &format!("status sync probe failed: {e}"),
                )
                .await?;
            }
        }

        tokio::time::sleep(PROBE_SPACING).await;
    }

    Ok(json!({
        "probed": probed,
        "transitioned": transitioned,
        "errors": errors,
    }))
}

async fn apply_probe(
    pool: &PgPool,
    trade_id: i64,
    held: Option<Decimal>,
    status: &str,
    executed_qty: Decimal,
    avg_price: Option<Decimal>,
) -> anyhow::Result<bool> {
    match status {
        "FILLED" => {
            if let Some(price) = avg_price {
                trade_repo::apply_entry_fill(
                    pool,
                    trade_id,
                    price,
                    if executed_qty.is_zero() {
                        held.unwrap_or(Decimal::ZERO)
                    } else {
                        executed_qty
                    },
                    chrono::Utc::now(),
                )
                .await?;
            }
            Ok(false)
        }
        "CANCELED" if executed_qty.is_zero() => {
            trade_repo::apply_terminal_no_fill(pool, trade_id, TradeStatus::Canceled).await?;
            Ok(true)
        }
        "EXPIRED" if executed_qty.is_zero() => {
            trade_repo::apply_terminal_no_fill(pool, trade_id, TradeStatus::Expired).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}
