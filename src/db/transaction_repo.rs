use sqlx::PgPool;

use crate::venue::IncomeEvent;

/// Insert venue income events, deduplicating on the
/// (time, type, amount, asset, symbol) tuple. Returns how many were new.
pub async fn insert_income_events(
    pool: &PgPool,
    events: &[IncomeEvent],
) -> anyhow::Result<u64> {
    let mut inserted = 0u64;
    for event in events {
        let result = sqlx::query(
            r#"
            INSERT INTO transaction_history (time, type, amount, asset, symbol)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (time, type, amount, asset, symbol) DO NOTHING
            "#,
        )
        .bind(event.time)
        .bind(&event.income_type)
        .bind(event.income)
        .bind(&event.asset)
        .bind(&event.symbol)
        .execute(pool)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}
