//! PnL backfill: closed trades missing realized PnL or an exit price get
//! both reconstructed from venue account-trades and income, matched by
//! order id. Venue `realizedPnl` wins over anything computed locally.
//! Lifecycle timestamps are never touched.

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::db::{trade_repo, transaction_repo};
use crate::fees::weighted_entry_price;
use crate::venue::FuturesVenue;

/// Slack around [created_at, closed_at] when scanning venue history.
const WINDOW_SLACK_MINUTES: i64 = 30;
const BATCH_LIMIT: i64 = 50;

pub async fn run(pool: &PgPool, venue: &dyn FuturesVenue) -> anyhow::Result<Value> {
    let trades = trade_repo::closed_trades_missing_pnl(pool, BATCH_LIMIT).await?;
    let mut backfilled = 0usize;
    let mut skipped = 0usize;

    for trade in &trades {
        let (Some(coin_symbol), Some(order_id)) =
            (trade.coin_symbol.as_deref(), trade.exchange_order_id.as_deref())
        else {
            skipped += 1;
            continue;
        };
        let pair = venue.trading_pair(coin_symbol);

        let start = trade
            .created_at
            .unwrap_or(trade.timestamp)
            - ChronoDuration::minutes(WINDOW_SLACK_MINUTES);
        let end = trade
            .closed_at
            .unwrap_or_else(Utc::now)
            + ChronoDuration::minutes(WINDOW_SLACK_MINUTES);

        let fills = match venue.account_trades(&pair, start, end).await {
            Ok(fills) => fills,
            Err(e) => {
                tracing::warn!(trade_id = trade.id, error = %e, "Account trades fetch failed");
                skipped += 1;
                continue;
            }
        };

        // Only fills executed by this trade's own orders count: the entry
        // order plus its protective TP/SL orders. Same-symbol trades with
        // overlapping windows must not bleed into each other.
        let mut trade_order_ids: Vec<String> = vec![order_id.to_string()];
        trade_order_ids.extend(trade.tp_sl_orders().into_iter().map(|o| o.order_id));
        let fills: Vec<_> = fills
            .into_iter()
            .filter(|f| trade_order_ids.iter().any(|id| id == &f.order_id))
            .collect();

        // Exit fills are the ones on the opposite side of the entry.
        let exit_side = trade
            .position_type()
            .map(|p| p.exit_side())
            .unwrap_or("SELL");
        let exits: Vec<_> = fills
            .iter()
            .filter(|f| f.side.eq_ignore_ascii_case(exit_side))
            .collect();

        let realized: Decimal = fills.iter().map(|f| f.realized_pnl).sum();
        let pnl = (!realized.is_zero()).then_some(realized).or_else(|| {
            // No venue PnL recorded — derive from entry/exit averages.
            let entry = trade.effective_entry_price()?;
            let exit_fills: Vec<(Decimal, Decimal)> =
                exits.iter().map(|f| (f.price, f.qty)).collect();
            let exit = weighted_entry_price(&exit_fills)?;
            let qty: Decimal = exits.iter().map(|f| f.qty).sum();
            let direction = match trade.position_type()? {
                crate::models::PositionType::Long => Decimal::ONE,
                crate::models::PositionType::Short => Decimal::NEGATIVE_ONE,
            };
            Some((exit - entry) * qty * direction)
        });

        let exit_price = {
            let exit_fills: Vec<(Decimal, Decimal)> =
                exits.iter().map(|f| (f.price, f.qty)).collect();
            weighted_entry_price(&exit_fills)
        };

        if pnl.is_none() && exit_price.is_none() {
            skipped += 1;
            continue;
        }
        trade_repo::backfill_pnl(pool, trade.id, exit_price, pnl).await?;
        backfilled += 1;
    }

    // Income events land in transaction_history on the same pass; the
    // four-tuple index deduplicates re-scans.
    let income_start = Utc::now() - ChronoDuration::hours(24);
    let mut income_recorded = 0u64;
    match venue.income_history(income_start, Utc::now()).await {
        Ok(events) => {
            income_recorded = transaction_repo::insert_income_events(pool, &events).await?;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Income history fetch failed");
        }
    }

    Ok(json!({
        "backfilled": backfilled,
        "skipped": skipped,
        "income_recorded": income_recorded,
    }))
}
