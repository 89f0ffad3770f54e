mod common;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use sigbot::db::{alert_repo, trade_repo};
use sigbot::engine::cooldown::CooldownTracker;
use sigbot::engine::mailbox::SymbolMailboxes;
use sigbot::engine::position_manager::{PositionManager, PositionPolicy};
use sigbot::engine::{EngineConfig, TradeCoordinator};
use sigbot::fees::{FeeCalculator, FeeMode};
use sigbot::models::{SignalEvent, TradeStatus};
use sigbot::pricing::PriceService;
use sigbot::signals::SignalRouter;
use sigbot::venue::FuturesVenue;

use common::mock_venue::MockVenue;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn build_router(pool: sqlx::PgPool, venue: Arc<MockVenue>) -> SignalRouter {
    let venue_dyn: Arc<dyn FuturesVenue> = venue;
    let coordinator = Arc::new(TradeCoordinator::new(
        pool.clone(),
        Arc::clone(&venue_dyn),
        PriceService::new(Arc::clone(&venue_dyn)),
        FeeCalculator::new(FeeMode::Fixed {
            rate: dec("0.0002"),
        }),
        CooldownTracker::new(Duration::ZERO, Duration::ZERO),
        PositionManager::new(PositionPolicy::default()),
        EngineConfig {
            trade_amount: dec("101"),
            min_trade_amount: dec("10"),
            max_trade_amount: dec("1000"),
            leverage: 1,
            price_threshold_pct: dec("2.0"),
            memecoin_price_threshold_pct: dec("5.0"),
        },
        None,
    ));
    SignalRouter::new(pool, coordinator, Arc::new(SymbolMailboxes::new()))
}

fn signal_at(ts: DateTime<Utc>, discord_id: &str) -> SignalEvent {
    SignalEvent {
        timestamp: ts,
        content: "HYPE long 32.2-31.5 SL 30.7".into(),
        structured: Some("LIMIT|HYPE|Entry:|32.2-31.5|SL:|30.7".into()),
        discord_id: Some(discord_id.into()),
        parent_ref: None,
        trader: Some("trader-a".into()),
    }
}

async fn trade_count(pool: &sqlx::PgPool) -> i64 {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades")
        .fetch_one(pool)
        .await
        .unwrap();
    row.0
}

#[tokio::test]
async fn initial_signal_binds_to_precreated_row_by_timestamp() {
    let pool = common::setup_test_db().await;
    let venue = Arc::new(MockVenue::new("31.8"));
    let router = build_router(pool.clone(), Arc::clone(&venue));

    let ts = DateTime::from_timestamp_millis(1_736_072_130_123).unwrap();
    let seeded = common::seed_pending_trade(&pool, "pre-created", ts).await;

    router.route(signal_at(ts, "ignored")).await.expect("route");

    // Bound to the existing row, not a new one.
    assert_eq!(trade_count(&pool).await, 1);
    let row = trade_repo::find_by_id(&pool, seeded.id).await.unwrap().unwrap();
    assert!(row.parsed_signal.is_some());
    assert_eq!(row.coin_symbol.as_deref(), Some("HYPE"));
    assert!(row.exchange_order_id.is_some());
}

#[tokio::test]
async fn missing_row_is_created_on_first_delivery() {
    let pool = common::setup_test_db().await;
    let venue = Arc::new(MockVenue::new("31.8"));
    let router = build_router(pool.clone(), Arc::clone(&venue));

    let ts = DateTime::from_timestamp_millis(1_736_072_131_500).unwrap();
    router.route(signal_at(ts, "fresh-1")).await.expect("route");

    assert_eq!(trade_count(&pool).await, 1);
    let row = trade_repo::find_by_discord_id(&pool, "fresh-1").await.unwrap().unwrap();
    assert_eq!(row.timestamp, ts);
}

#[tokio::test]
async fn duplicate_delivery_causes_one_row_and_one_placement() {
    let pool = common::setup_test_db().await;
    let venue = Arc::new(MockVenue::new("31.8"));
    let router = build_router(pool.clone(), Arc::clone(&venue));

    let ts = DateTime::from_timestamp_millis(1_736_072_132_777).unwrap();
    let event = signal_at(ts, "dup-1");

    router.route(event.clone()).await.expect("first delivery");
    let placements_after_first = venue.placed_requests().len();
    router.route(event).await.expect("second delivery");

    assert_eq!(trade_count(&pool).await, 1);
    // Entry + protective stop from the first delivery, nothing more.
    assert_eq!(venue.placed_requests().len(), placements_after_first);
    let entries = venue
        .placed_requests()
        .iter()
        .filter(|r| r.order_type == "LIMIT")
        .count();
    assert_eq!(entries, 1, "exactly one placement attempt");
}

#[tokio::test]
async fn followup_for_terminal_parent_is_skipped() {
    let pool = common::setup_test_db().await;
    let venue = Arc::new(MockVenue::new("31.8"));
    let router = build_router(pool.clone(), Arc::clone(&venue));

    let parent = common::seed_pending_trade(&pool, "parent-failed", Utc::now()).await;
    trade_repo::mark_failed(&pool, parent.id, TradeStatus::Failed, "margin").await.unwrap();

    let event = SignalEvent {
        timestamp: Utc::now(),
        content: "HYPE stopped out".into(),
        structured: None,
        discord_id: Some("alert-1".into()),
        parent_ref: Some("parent-failed".into()),
        trader: None,
    };
    router.route(event).await.expect("route alert");

    let alerts = alert_repo::alerts_for_trade(&pool, "parent-failed").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, "skipped");
    assert!(venue.placed_requests().is_empty());
}

#[tokio::test]
async fn followup_for_unknown_parent_is_recorded_as_failed() {
    let pool = common::setup_test_db().await;
    let venue = Arc::new(MockVenue::new("31.8"));
    let router = build_router(pool.clone(), Arc::clone(&venue));

    let event = SignalEvent {
        timestamp: Utc::now(),
        content: "tp1 hit".into(),
        structured: None,
        discord_id: Some("alert-orphan".into()),
        parent_ref: Some("no-such-trade".into()),
        trader: None,
    };
    router.route(event).await.expect("route alert");

    let alerts = alert_repo::alerts_for_trade(&pool, "no-such-trade").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, "failed");
}

#[tokio::test]
async fn tp1_followup_halves_open_parent() {
    let pool = common::setup_test_db().await;
    let venue = Arc::new(MockVenue::new("33.0"));
    venue.set_position("HYPEUSDT", "3.17", "32");
    let router = build_router(pool.clone(), Arc::clone(&venue));

    let parent =
        common::seed_open_trade(&pool, "parent-open", "HYPE", "LONG", dec("32"), dec("3.17"))
            .await;

    let event = SignalEvent {
        timestamp: Utc::now(),
        content: " ETH \u{2060}🚀｜trades\u{2060}: tp1 hit".into(),
        structured: None,
        discord_id: Some("alert-tp1".into()),
        parent_ref: Some("parent-open".into()),
        trader: None,
    };
    router.route(event).await.expect("route alert");

    let alerts = alert_repo::alerts_for_trade(&pool, "parent-open").await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].status, "applied");
    assert!(alerts[0].binance_response.is_some());

    let row = trade_repo::find_by_id(&pool, parent.id).await.unwrap().unwrap();
    assert_eq!(row.status(), TradeStatus::PartiallyClosed);
    assert_eq!(row.position_size, Some(dec("1.59")));
}
