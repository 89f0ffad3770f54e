use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::models::Balance;

/// Upsert one venue balance snapshot.
pub async fn upsert_balance(
    pool: &PgPool,
    platform: &str,
    account_type: &str,
    asset: &str,
    free: Decimal,
    locked: Decimal,
    total: Decimal,
    unrealized_pnl: Decimal,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO balances (platform, account_type, asset, free, locked, total, unrealized_pnl, last_updated)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
        ON CONFLICT (platform, account_type, asset) DO UPDATE
        SET free = EXCLUDED.free,
            locked = EXCLUDED.locked,
            total = EXCLUDED.total,
            unrealized_pnl = EXCLUDED.unrealized_pnl,
            last_updated = NOW()
        "#,
    )
    .bind(platform)
    .bind(account_type)
    .bind(asset)
    .bind(free)
    .bind(locked)
    .bind(total)
    .bind(unrealized_pnl)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn balances_for_platform(pool: &PgPool, platform: &str) -> anyhow::Result<Vec<Balance>> {
    let balances = sqlx::query_as::<_, Balance>(
        "SELECT * FROM balances WHERE platform = $1 ORDER BY asset",
    )
    .bind(platform)
    .fetch_all(pool)
    .await?;
    Ok(balances)
}
