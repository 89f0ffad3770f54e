//! Orphan cleanup: cancel reduce-only protective orders on symbols with no
//! live position. Orders on symbols covered by a merged/aggregated local
//! trade are left alone.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::db::trade_repo;
use crate::venue::FuturesVenue;

pub async fn run(pool: &PgPool, venue: &dyn FuturesVenue) -> anyhow::Result<Value> {
    let open_orders = venue.open_orders(None).await?;
    let positions = venue.position_risk(None).await?;

    let live_symbols: HashSet<String> = positions
        .iter()
        .filter(|p| p.position_amt.abs() > Decimal::ZERO)
        .map(|p| p.symbol.clone())
        .collect();

    // Symbols whose local trades are part of a merge keep their protective
    // orders even while the venue shows the aggregate under the primary.
    let local_trades = trade_repo::all_open_trades(pool).await?;
    let merged_symbols: HashSet<String> = local_trades
        .iter()
        .filter(|t| t.merged_into_trade_id.is_some())
        .filter_map(|t| t.coin_symbol.as_deref())
        .map(|coin| venue.trading_pair(coin))
        .collect();

    let mut cancelled = 0usize;
    let mut kept = 0usize;
    for order in open_orders.iter().filter(|o| o.is_protective()) {
        if live_symbols.contains(&order.symbol) {
            kept += 1;
            continue;
        }
        if merged_symbols.contains(&order.symbol) {
            kept += 1;
            tracing::debug!(
                symbol = %order.symbol,
                order_id = %order.order_id,
                "Orphan candidate belongs to a merged position — kept"
            );
            continue;
        }

        match venue.cancel_order(&order.symbol, &order.order_id).await {
            Ok(_) => {
                cancelled += 1;
                tracing::info!(
                    symbol = %order.symbol,
                    order_id = %order.order_id,
                    kind = %order.order_type,
                    "Cancelled orphaned protective order"
                );
            }
            Err(e) => {
                tracing::warn!(
                    symbol = %order.symbol,
                    order_id = %order.order_id,
                    error = %e,
                    "Failed to cancel orphaned order"
                );
            }
        }
    }

    Ok(json!({
        "protective_orders": open_orders.iter().filter(|o| o.is_protective()).count(),
        "cancelled": cancelled,
        "kept": kept,
    }))
}
