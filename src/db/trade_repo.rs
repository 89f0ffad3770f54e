use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;

use crate::models::{Trade, TradeStatus};

/// Insert a bare trade row for an initial signal. The router binds signals
/// to rows by timestamp, so `timestamp` is the signal's emission instant.
pub async fn insert_signal_trade(
    pool: &PgPool,
    discord_id: &str,
    timestamp: DateTime<Utc>,
) -> anyhow::Result<Trade> {
    let trade = sqlx::query_as::<_, Trade>(
        r#"
        INSERT INTO trades (discord_id, timestamp, status)
        VALUES ($1, $2, 'PENDING')
        ON CONFLICT (discord_id) DO UPDATE SET updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(discord_id)
    .bind(timestamp)
    .fetch_one(pool)
    .await?;

    Ok(trade)
}

/// Look up the row pre-created for a signal at millisecond precision:
/// `[t, t+1ms)`.
pub async fn find_by_timestamp_range(
    pool: &PgPool,
    timestamp: DateTime<Utc>,
) -> anyhow::Result<Option<Trade>> {
    let end = timestamp + Duration::milliseconds(1);
    let trade = sqlx::query_as::<_, Trade>(
        "SELECT * FROM trades WHERE timestamp >= $1 AND timestamp < $2 ORDER BY id LIMIT 1",
    )
    .bind(timestamp)
    .bind(end)
    .fetch_optional(pool)
    .await?;

    Ok(trade)
}

pub async fn find_by_discord_id(pool: &PgPool, discord_id: &str) -> anyhow::Result<Option<Trade>> {
    let trade = sqlx::query_as::<_, Trade>("SELECT * FROM trades WHERE discord_id = $1")
        .bind(discord_id)
        .fetch_optional(pool)
        .await?;
    Ok(trade)
}

pub async fn find_by_id(pool: &PgPool, id: i64) -> anyhow::Result<Option<Trade>> {
    let trade = sqlx::query_as::<_, Trade>("SELECT * FROM trades WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(trade)
}

/// Resolve a trade from an execution report: direct match on the stored
/// order id, with a fallback scan of the persisted venue payloads.
pub async fn find_by_exchange_order_id(
    pool: &PgPool,
    order_id: &str,
) -> anyhow::Result<Option<Trade>> {
    let trade = sqlx::query_as::<_, Trade>(
        r#"
        SELECT * FROM trades
        WHERE exchange_order_id = $1
           OR binance_response ->> 'orderId' = $1
           OR original_order_response ->> 'orderId' = $1
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    Ok(trade)
}

/// Attach the parsed signal to a bound row.
pub async fn set_parsed_signal(
    pool: &PgPool,
    id: i64,
    parsed: &Value,
    coin_symbol: &str,
    position_type: &str,
    order_type: &str,
    entry_price: Option<Decimal>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET parsed_signal = $2, coin_symbol = $3, position_type = $4,
            order_type = $5, entry_price = $6, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(parsed)
    .bind(coin_symbol)
    .bind(position_type)
    .bind(order_type)
    .bind(entry_price)
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomically claim a PENDING row for placement. Returns false when another
/// delivery already claimed it, which keeps re-delivered signals to exactly
/// one placement attempt.
pub async fn claim_for_processing(pool: &PgPool, id: i64) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE trades
        SET signal_type = 'initial', updated_at = NOW()
        WHERE id = $1 AND signal_type IS NULL AND status = 'PENDING'
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Move a trade to a preflight/placement failure state with a reason blob.
pub async fn mark_failed(
    pool: &PgPool,
    id: i64,
    status: TradeStatus,
    reason: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET status = $2,
            binance_response = jsonb_build_object('error', $3::text),
            updated_at = NOW()
        WHERE id = $1 AND status NOT IN ('CLOSED', 'CANCELED', 'EXPIRED')
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist a successful placement. `original_order_response` is write-once
/// (COALESCE keeps the first payload); `created_at` is set only from null.
#[allow(clippy::too_many_arguments)]
pub async fn record_placement(
    pool: &PgPool,
    id: i64,
    response: &Value,
    exchange_order_id: &str,
    position_size: Decimal,
    entry_price: Option<Decimal>,
    status: TradeStatus,
    created_at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET original_order_response = COALESCE(original_order_response, $2),
            binance_response = $2,
            exchange_order_id = $3,
            position_size = $4,
            binance_entry_price = COALESCE($5, binance_entry_price),
            status = $6,
            created_at = COALESCE(created_at, $7),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(response)
    .bind(exchange_order_id)
    .bind(position_size)
    .bind(entry_price)
    .bind(status.as_str())
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Persist a status-probe payload. Never touches the placement record.
pub async fn record_status_probe(pool: &PgPool, id: i64, response: &Value) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET order_status_response = $2, binance_response = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(response)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn increment_sync_error(pool: &PgPool, id: i64, issue: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET sync_error_count = sync_error_count + 1,
            sync_issues = sync_issues || jsonb_build_array($2::text),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(issue)
    .execute(pool)
    .await?;
    Ok(())
}

/// Apply a full or partial close. `closed_at` is written only on a full
/// close and only from null; CLOSED is the only status that sets it.
pub async fn record_close(
    pool: &PgPool,
    id: i64,
    status: TradeStatus,
    exit_price: Option<Decimal>,
    pnl_usd: Option<Decimal>,
    remaining_size: Decimal,
    closed_at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    let closed_at = (status == TradeStatus::Closed).then_some(closed_at).flatten();
    sqlx::query(
        r#"
        UPDATE trades
        SET status = $2,
            exit_price = COALESCE($3, exit_price),
            pnl_usd = COALESCE($4, pnl_usd),
            position_size = $5,
            closed_at = COALESCE(closed_at, $6),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(exit_price)
    .bind(pnl_usd)
    .bind(remaining_size)
    .bind(closed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_tp_sl_orders(pool: &PgPool, id: i64, orders: &Value) -> anyhow::Result<()> {
    sqlx::query("UPDATE trades SET tp_sl_orders = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(orders)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_manual_verification(pool: &PgPool, id: i64, needed: bool) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE trades SET manual_verification_needed = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(needed)
    .execute(pool)
    .await?;
    Ok(())
}

/// Trades holding live quantity for a coin symbol.
pub async fn open_trades_for_symbol(
    pool: &PgPool,
    coin_symbol: &str,
) -> anyhow::Result<Vec<Trade>> {
    let trades = sqlx::query_as::<_, Trade>(
        r#"
        SELECT * FROM trades
        WHERE coin_symbol = $1 AND status IN ('OPEN', 'PARTIALLY_CLOSED')
        ORDER BY id
        "#,
    )
    .bind(coin_symbol)
    .fetch_all(pool)
    .await?;
    Ok(trades)
}

/// Open trades young enough for the status-sync loop to probe.
pub async fn open_trades_younger_than(
    pool: &PgPool,
    max_age_hours: i64,
) -> anyhow::Result<Vec<Trade>> {
    let cutoff = Utc::now() - Duration::hours(max_age_hours);
    let trades = sqlx::query_as::<_, Trade>(
        r#"
        SELECT * FROM trades
        WHERE status IN ('OPEN', 'PARTIALLY_CLOSED')
          AND COALESCE(created_at, timestamp) >= $1
        ORDER BY id
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(trades)
}

/// Closed trades missing PnL or exit price, for the backfill loop.
pub async fn closed_trades_missing_pnl(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<Trade>> {
    let trades = sqlx::query_as::<_, Trade>(
        r#"
        SELECT * FROM trades
        WHERE status = 'CLOSED'
          AND (pnl_usd IS NULL OR exit_price IS NULL)
          AND exchange_order_id IS NOT NULL
        ORDER BY closed_at DESC NULLS LAST
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(trades)
}

/// Backfill PnL/exit price without touching lifecycle timestamps.
pub async fn backfill_pnl(
    pool: &PgPool,
    id: i64,
    exit_price: Option<Decimal>,
    pnl_usd: Option<Decimal>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET exit_price = COALESCE(exit_price, $2),
            pnl_usd = COALESCE(pnl_usd, $3),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(exit_price)
    .bind(pnl_usd)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a merge: the secondary row points at the surviving primary. The
/// secondary keeps its own lifecycle status; conflict checks and orphan
/// cleanup treat it as part of the primary's aggregate.
pub async fn mark_merged(
    pool: &PgPool,
    secondary_id: i64,
    primary_id: i64,
    reason: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET merged_into_trade_id = $2, merge_reason = $3, merged_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(secondary_id)
    .bind(primary_id)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

/// Enlarge the primary side of a merge with the weighted entry and new size.
pub async fn apply_merge_to_primary(
    pool: &PgPool,
    primary_id: i64,
    entry_price: Decimal,
    position_size: Decimal,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET binance_entry_price = $2, position_size = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(primary_id)
    .bind(entry_price)
    .bind(position_size)
    .execute(pool)
    .await?;
    Ok(())
}

/// Any trade holding live quantity whose coin symbol maps to this venue
/// pair, used by the audit and orphan loops.
pub async fn all_open_trades(pool: &PgPool) -> anyhow::Result<Vec<Trade>> {
    let trades = sqlx::query_as::<_, Trade>(
        "SELECT * FROM trades WHERE status IN ('OPEN', 'PARTIALLY_CLOSED') ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(trades)
}

/// Resolve a trade whose protective TP/SL order matches the given id.
pub async fn find_by_protective_order_id(
    pool: &PgPool,
    order_id: &str,
) -> anyhow::Result<Option<Trade>> {
    let trade = sqlx::query_as::<_, Trade>(
        r#"
        SELECT * FROM trades
        WHERE tp_sl_orders @> jsonb_build_array(jsonb_build_object('order_id', $1::text))
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    Ok(trade)
}

/// Entry fill from the user-data stream: CAS `created_at` against null, set
/// the venue fill price and size, move to OPEN.
pub async fn apply_entry_fill(
    pool: &PgPool,
    id: i64,
    entry_price: Decimal,
    position_size: Decimal,
    event_time: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET created_at = COALESCE(created_at, $4),
            binance_entry_price = $2,
            position_size = $3,
            status = 'OPEN',
            updated_at = NOW()
        WHERE id = $1 AND status NOT IN ('CLOSED', 'CANCELED', 'EXPIRED', 'FAILED')
        "#,
    )
    .bind(id)
    .bind(entry_price)
    .bind(position_size)
    .bind(event_time)
    .execute(pool)
    .await?;
    Ok(())
}

/// Terminal transition for an entry order that never filled.
pub async fn apply_terminal_no_fill(
    pool: &PgPool,
    id: i64,
    status: TradeStatus,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE trades
        SET status = $2, updated_at = NOW()
        WHERE id = $1 AND status IN ('PENDING', 'UNFILLED', 'OPEN')
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .execute(pool)
    .await?;
    Ok(())
}
