//! Balance sync: snapshot venue futures balances into the balances table.

use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::db::balance_repo;
use crate::venue::FuturesVenue;

pub async fn run(pool: &PgPool, venue: &dyn FuturesVenue) -> anyhow::Result<Value> {
    let balances = venue.account_balances().await?;
    let mut synced = 0usize;

    for balance in &balances {
        // Skip empty dust rows; the venue reports every listed asset.
        if balance.balance.is_zero() && balance.available.is_zero() {
            continue;
        }
        let locked = (balance.balance - balance.available).max(Decimal::ZERO);
        balance_repo::upsert_balance(
            pool,
            venue.name(),
            "futures",
            &balance.asset,
            balance.available,
            locked,
            balance.balance,
            balance.cross_unrealized_pnl,
        )
        .await?;
        synced += 1;
    }

    Ok(json!({ "assets_synced": synced }))
}
