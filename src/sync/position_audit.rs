//! Active-futures audit: every live venue position must be explained by a
//! local trade. Matching is scored — symbol 0.5, side 0.3, size proximity
//! 0.2 — and positions below the confidence threshold get flagged for
//! manual verification.

use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::db::trade_repo;
use crate::models::{PositionType, Trade};
use crate::venue::{FuturesVenue, PositionInfo};

fn symbol_weight() -> Decimal {
    Decimal::new(5, 1)
}
fn side_weight() -> Decimal {
    Decimal::new(3, 1)
}
fn size_weight() -> Decimal {
    Decimal::new(2, 1)
}
fn confidence_threshold() -> Decimal {
    Decimal::new(8, 1)
}
/// Sizes within this relative tolerance count as matching.
fn size_tolerance() -> Decimal {
    Decimal::new(10, 2)
}

pub async fn run(pool: &PgPool, venue: &dyn FuturesVenue) -> anyhow::Result<Value> {
    let positions = venue.position_risk(None).await?;
    let local_trades = trade_repo::all_open_trades(pool).await?;

    let threshold = confidence_threshold();
    let mut audited = 0usize;
    let mut unmatched = 0usize;

    for position in positions
        .iter()
        .filter(|p| p.position_amt.abs() > Decimal::ZERO)
    {
        audited += 1;
        let best = local_trades
            .iter()
            .map(|trade| (trade, match_confidence(venue, trade, position)))
            .max_by(|(_, a), (_, b)| a.cmp(b));

        match best {
            Some((_, confidence)) if confidence >= threshold => {}
            Some((candidate, confidence)) => {
                unmatched += 1;
                tracing::warn!(
                    symbol = %position.symbol,
                    position_amt = %position.position_amt,
                    best_candidate = candidate.id,
                    confidence = %confidence,
                    "Venue position not explained by any local trade"
                );
                trade_repo::set_manual_verification(pool, candidate.id, true).await?;
                trade_repo::increment_sync_error(
                    pool,
                    candidate.id,
                    &format!(
                        "position audit: {} amt {} matched with confidence {}",
                        position.symbol, position.position_amt, confidence
                    ),
                )
                .await?;
            }
            None => {
                unmatched += 1;
                tracing::warn!(
                    symbol = %position.symbol,
                    position_amt = %position.position_amt,
                    "Venue position with no local trade rows at all"
                );
            }
        }
    }

    Ok(json!({ "audited": audited, "unmatched": unmatched }))
}

/// Score how well a local trade explains a venue position.
fn match_confidence(venue: &dyn FuturesVenue, trade: &Trade, position: &PositionInfo) -> Decimal {
    let mut confidence = Decimal::ZERO;

    let pair = trade
        .coin_symbol
        .as_deref()
        .map(|coin| venue.trading_pair(coin));
    if pair.as_deref() == Some(position.symbol.as_str()) {
        confidence += symbol_weight();
    } else {
        // Wrong symbol: side/size agreement is meaningless.
        return confidence;
    }

    let venue_side = if position.position_amt > Decimal::ZERO {
        PositionType::Long
    } else {
        PositionType::Short
    };
    if trade.position_type() == Some(venue_side) {
        confidence += side_weight();
    }

    if let Some(size) = trade.position_size {
        let venue_size = position.position_amt.abs();
        if !venue_size.is_zero() {
            let deviation = ((size - venue_size) / venue_size).abs();
            if deviation <= size_tolerance() {
                confidence += size_weight();
            }
        }
    }

    confidence
}
