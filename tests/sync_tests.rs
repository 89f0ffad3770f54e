mod common;

use std::str::FromStr;

use rust_decimal::Decimal;

use chrono::{Duration, Utc};

use sigbot::db::{balance_repo, trade_repo};
use sigbot::models::TradeStatus;
use sigbot::sync::{balance_sync, orphan_cleanup, pnl_backfill, position_audit, status_sync};
use sigbot::venue::VenueError;

use common::mock_venue::{permission_denied, MockVenue};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn orphan_cleanup_cancels_only_positionless_symbols() {
    let pool = common::setup_test_db().await;
    let venue = MockVenue::new("100");

    // SOL has a resting reduce-only stop but no position; BTC has both.
    venue.add_open_order("SOLUSDT", "sol-sl-1", "STOP_MARKET");
    venue.add_open_order("BTCUSDT", "btc-sl-1", "STOP_MARKET");
    venue.set_position("BTCUSDT", "0.5", "60000");

    orphan_cleanup::run(&pool, &venue).await.expect("cleanup");

    let cancelled = venue.cancelled_orders();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0], ("SOLUSDT".to_string(), "sol-sl-1".to_string()));
}

#[tokio::test]
async fn orphan_cleanup_spares_merged_positions() {
    let pool = common::setup_test_db().await;
    let venue = MockVenue::new("100");
    venue.add_open_order("HYPEUSDT", "hype-sl-1", "STOP_MARKET");

    // The secondary of a merge keeps its protective order even though the
    // venue shows no separate position for it.
    let primary =
        common::seed_open_trade(&pool, "merge-primary", "HYPE", "LONG", dec("32"), dec("3")).await;
    let secondary =
        common::seed_open_trade(&pool, "merge-secondary", "HYPE", "LONG", dec("31"), dec("1")).await;
    trade_repo::mark_merged(&pool, secondary.id, primary.id, "same-side addition")
        .await
        .unwrap();

    orphan_cleanup::run(&pool, &venue).await.expect("cleanup");
    assert!(venue.cancelled_orders().is_empty());
}

#[tokio::test]
async fn status_probe_failure_only_increments_sync_error() {
    let pool = common::setup_test_db().await;
    let venue = MockVenue::new("100");
    venue.script_status(Err(permission_denied()));

    let trade =
        common::seed_open_trade(&pool, "probe-open", "HYPE", "LONG", dec("32"), dec("3.17")).await;

    status_sync::run(&pool, &venue).await.expect("status sync");

    let row = trade_repo::find_by_id(&pool, trade.id).await.unwrap().unwrap();
    assert_eq!(row.status(), TradeStatus::Open);
    assert_eq!(row.sync_error_count, 1);
    assert!(row.order_status_response.is_none());
}

#[tokio::test]
async fn vanished_order_counts_as_closed_earlier() {
    let pool = common::setup_test_db().await;
    let venue = MockVenue::new("100");
    venue.script_status(Err(VenueError::OrderNotFound("Order does not exist".into())));

    let trade =
        common::seed_open_trade(&pool, "probe-gone", "HYPE", "LONG", dec("32"), dec("3.17")).await;

    status_sync::run(&pool, &venue).await.expect("status sync");

    let row = trade_repo::find_by_id(&pool, trade.id).await.unwrap().unwrap();
    assert_eq!(row.status(), TradeStatus::Closed);
    assert!(row.closed_at.is_some());
}

#[tokio::test]
async fn balance_sync_upserts_venue_balances() {
    let pool = common::setup_test_db().await;
    let venue = MockVenue::new("100");

    balance_sync::run(&pool, &venue).await.expect("balance sync");
    balance_sync::run(&pool, &venue).await.expect("idempotent rerun");

    let balances = balance_repo::balances_for_platform(&pool, "mock").await.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].asset, "USDT");
    assert_eq!(balances[0].total, dec("1000"));
    assert_eq!(balances[0].free, dec("900"));
    assert_eq!(balances[0].locked, dec("100"));
}

#[tokio::test]
async fn pnl_backfill_matches_fills_by_order_id() {
    let pool = common::setup_test_db().await;
    let venue = MockVenue::new("33");

    // Two HYPE longs closed five minutes apart: their ±30min scan windows
    // overlap, so only the order-id match keeps their fills separate.
    let opened = Utc::now() - Duration::minutes(40);
    let first_close = Utc::now() - Duration::minutes(10);
    let second_close = Utc::now() - Duration::minutes(5);

    let first = common::seed_closed_trade_missing_pnl(
        &pool, "backfill-a", "HYPE", "LONG", dec("32"), "order-a", opened, first_close,
    )
    .await;
    let second = common::seed_closed_trade_missing_pnl(
        &pool, "backfill-b", "HYPE", "LONG", dec("31"), "order-b", opened, second_close,
    )
    .await;

    venue.add_fill("HYPEUSDT", "order-a", "SELL", "33", "3", "3.00", first_close);
    venue.add_fill("HYPEUSDT", "order-b", "SELL", "35", "2", "8.00", second_close);

    pnl_backfill::run(&pool, &venue).await.expect("backfill");

    let row_a = trade_repo::find_by_id(&pool, first.id).await.unwrap().unwrap();
    assert_eq!(row_a.pnl_usd, Some(dec("3.00")));
    assert_eq!(row_a.exit_price, Some(dec("33.00000000")));

    let row_b = trade_repo::find_by_id(&pool, second.id).await.unwrap().unwrap();
    assert_eq!(row_b.pnl_usd, Some(dec("8.00")));
    assert_eq!(row_b.exit_price, Some(dec("35.00000000")));
}

#[tokio::test]
async fn pnl_backfill_computes_when_venue_reports_no_pnl() {
    let pool = common::setup_test_db().await;
    let venue = MockVenue::new("33");

    let opened = Utc::now() - Duration::minutes(40);
    let closed = Utc::now() - Duration::minutes(10);
    let trade = common::seed_closed_trade_missing_pnl(
        &pool, "backfill-c", "HYPE", "LONG", dec("32"), "order-c", opened, closed,
    )
    .await;

    // Exit fill carries no realized PnL, so the loop derives it from the
    // entry/exit averages: (33 - 32) × 3.
    venue.add_fill("HYPEUSDT", "order-c", "SELL", "33", "3", "0", closed);
    // A foreign same-symbol fill in the window must be ignored.
    venue.add_fill("HYPEUSDT", "order-other", "SELL", "40", "5", "25.00", closed);

    pnl_backfill::run(&pool, &venue).await.expect("backfill");

    let row = trade_repo::find_by_id(&pool, trade.id).await.unwrap().unwrap();
    assert_eq!(row.pnl_usd, Some(dec("3.00000000")));
    assert_eq!(row.exit_price, Some(dec("33.00000000")));
}

#[tokio::test]
async fn audit_flags_unexplained_venue_positions() {
    let pool = common::setup_test_db().await;
    let venue = MockVenue::new("100");
    // Venue long 5 SOL; the only local trade is a HYPE long.
    venue.set_position("SOLUSDT", "5", "150");
    let candidate =
        common::seed_open_trade(&pool, "audit-1", "HYPE", "LONG", dec("32"), dec("3.17")).await;

    position_audit::run(&pool, &venue).await.expect("audit");

    let row = trade_repo::find_by_id(&pool, candidate.id).await.unwrap().unwrap();
    assert!(row.manual_verification_needed);
    assert!(row.sync_error_count >= 1);
}

#[tokio::test]
async fn audit_accepts_matching_positions() {
    let pool = common::setup_test_db().await;
    let venue = MockVenue::new("100");
    venue.set_position("HYPEUSDT", "3.17", "32");
    let matching =
        common::seed_open_trade(&pool, "audit-2", "HYPE", "LONG", dec("32"), dec("3.17")).await;

    position_audit::run(&pool, &venue).await.expect("audit");

    let row = trade_repo::find_by_id(&pool, matching.id).await.unwrap().unwrap();
    assert!(!row.manual_verification_needed);
    assert_eq!(row.sync_error_count, 0);
}
