mod common;

use std::str::FromStr;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use sigbot::db::{trade_repo, transaction_repo};
use sigbot::models::TradeStatus;
use sigbot::venue::IncomeEvent;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn original_order_response_is_write_once() {
    let pool = common::setup_test_db().await;
    let trade = common::seed_pending_trade(&pool, "wo-1", Utc::now()).await;

    let first = json!({ "orderId": "A1", "status": "NEW" });
    let second = json!({ "orderId": "A1", "status": "FILLED" });

    trade_repo::record_placement(
        &pool, trade.id, &first, "A1", dec("3.17"), None, TradeStatus::Pending, None,
    )
    .await
    .unwrap();
    trade_repo::record_placement(
        &pool, trade.id, &second, "A1", dec("3.17"), None, TradeStatus::Open, Some(Utc::now()),
    )
    .await
    .unwrap();

    let row = trade_repo::find_by_id(&pool, trade.id).await.unwrap().unwrap();
    // First payload survives; the latest lives in binance_response.
    assert_eq!(row.original_order_response.unwrap()["status"], "NEW");
    assert_eq!(row.binance_response.unwrap()["status"], "FILLED");
}

#[tokio::test]
async fn created_at_and_closed_at_are_write_once() {
    let pool = common::setup_test_db().await;
    let trade = common::seed_pending_trade(&pool, "wo-2", Utc::now()).await;

    let first_open = Utc::now() - Duration::minutes(10);
    trade_repo::apply_entry_fill(&pool, trade.id, dec("32"), dec("3.17"), first_open)
        .await
        .unwrap();
    // A later replayed fill must not move created_at.
    trade_repo::apply_entry_fill(&pool, trade.id, dec("32"), dec("3.17"), Utc::now())
        .await
        .unwrap();

    let first_close = Utc::now() - Duration::minutes(5);
    trade_repo::record_close(
        &pool, trade.id, TradeStatus::Closed, Some(dec("33")), Some(dec("3.17")),
        Decimal::ZERO, Some(first_close),
    )
    .await
    .unwrap();
    trade_repo::record_close(
        &pool, trade.id, TradeStatus::Closed, Some(dec("34")), None,
        Decimal::ZERO, Some(Utc::now()),
    )
    .await
    .unwrap();

    let row = trade_repo::find_by_id(&pool, trade.id).await.unwrap().unwrap();
    assert_eq!(row.created_at.unwrap().timestamp_millis(), first_open.timestamp_millis());
    assert_eq!(row.closed_at.unwrap().timestamp_millis(), first_close.timestamp_millis());
    assert!(row.created_at.unwrap() <= row.closed_at.unwrap());
    // The exit price also keeps its first non-null value.
    assert_eq!(row.exit_price, Some(dec("33")));
}

#[tokio::test]
async fn closed_at_is_only_set_by_a_full_close() {
    let pool = common::setup_test_db().await;
    let trade = common::seed_pending_trade(&pool, "wo-3", Utc::now()).await;

    trade_repo::record_close(
        &pool, trade.id, TradeStatus::PartiallyClosed, Some(dec("33")), None,
        dec("1.59"), Some(Utc::now()),
    )
    .await
    .unwrap();

    let row = trade_repo::find_by_id(&pool, trade.id).await.unwrap().unwrap();
    assert_eq!(row.status(), TradeStatus::PartiallyClosed);
    assert!(row.closed_at.is_none());
}

#[tokio::test]
async fn probe_payload_stays_out_of_the_placement_record() {
    let pool = common::setup_test_db().await;
    let trade = common::seed_pending_trade(&pool, "probe-1", Utc::now()).await;

    let placement = json!({ "orderId": "B7", "status": "NEW" });
    trade_repo::record_placement(
        &pool, trade.id, &placement, "B7", dec("1"), None, TradeStatus::Pending, None,
    )
    .await
    .unwrap();
    trade_repo::record_status_probe(&pool, trade.id, &json!({ "orderId": "B7", "status": "FILLED" }))
        .await
        .unwrap();

    let row = trade_repo::find_by_id(&pool, trade.id).await.unwrap().unwrap();
    assert_eq!(row.original_order_response.unwrap()["status"], "NEW");
    assert_eq!(row.order_status_response.unwrap()["status"], "FILLED");
}

#[tokio::test]
async fn claim_for_processing_is_single_shot() {
    let pool = common::setup_test_db().await;
    let trade = common::seed_pending_trade(&pool, "claim-1", Utc::now()).await;

    assert!(trade_repo::claim_for_processing(&pool, trade.id).await.unwrap());
    assert!(!trade_repo::claim_for_processing(&pool, trade.id).await.unwrap());
}

#[tokio::test]
async fn execution_reports_resolve_through_payload_scan() {
    let pool = common::setup_test_db().await;
    let trade = common::seed_pending_trade(&pool, "scan-1", Utc::now()).await;

    // Order id only present inside the stored payload.
    sqlx::query("UPDATE trades SET binance_response = $2 WHERE id = $1")
        .bind(trade.id)
        .bind(json!({ "orderId": "deep-42" }))
        .execute(&pool)
        .await
        .unwrap();

    let found = trade_repo::find_by_exchange_order_id(&pool, "deep-42").await.unwrap();
    assert_eq!(found.unwrap().id, trade.id);
}

#[tokio::test]
async fn protective_order_ids_resolve_their_trade() {
    let pool = common::setup_test_db().await;
    let trade = common::seed_pending_trade(&pool, "prot-1", Utc::now()).await;

    trade_repo::set_tp_sl_orders(
        &pool,
        trade.id,
        &json!([{ "order_id": "sl-99", "kind": "SL", "trigger_price": "30.7" }]),
    )
    .await
    .unwrap();

    let found = trade_repo::find_by_protective_order_id(&pool, "sl-99").await.unwrap();
    assert_eq!(found.unwrap().id, trade.id);
    let missing = trade_repo::find_by_protective_order_id(&pool, "sl-1").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn backfill_never_overwrites_recorded_pnl() {
    let pool = common::setup_test_db().await;
    let trade = common::seed_pending_trade(&pool, "pnl-1", Utc::now()).await;

    // Venue realized PnL recorded at close time wins over any later
    // computed backfill.
    trade_repo::record_close(
        &pool, trade.id, TradeStatus::Closed, Some(dec("33")), Some(dec("1.23")),
        Decimal::ZERO, Some(Utc::now()),
    )
    .await
    .unwrap();
    trade_repo::backfill_pnl(&pool, trade.id, Some(dec("34")), Some(dec("9.99")))
        .await
        .unwrap();

    let row = trade_repo::find_by_id(&pool, trade.id).await.unwrap().unwrap();
    assert_eq!(row.pnl_usd, Some(dec("1.23")));
    assert_eq!(row.exit_price, Some(dec("33")));
}

#[tokio::test]
async fn income_events_dedupe_on_the_four_tuple() {
    let pool = common::setup_test_db().await;
    let event = IncomeEvent {
        time: Utc::now(),
        income_type: "REALIZED_PNL".into(),
        income: dec("1.23"),
        asset: "USDT".into(),
        symbol: "HYPEUSDT".into(),
    };

    let first = transaction_repo::insert_income_events(&pool, &[event.clone()]).await.unwrap();
    let second = transaction_repo::insert_income_events(&pool, &[event]).await.unwrap();

    assert_eq!(first, 1);
    assert_eq!(second, 0);
}
