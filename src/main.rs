use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use sigbot::api::router::create_router;
use sigbot::config::AppConfig;
use sigbot::engine::cooldown::CooldownTracker;
use sigbot::engine::mailbox::SymbolMailboxes;
use sigbot::engine::position_manager::{PositionManager, PositionPolicy};
use sigbot::engine::{EngineConfig, TradeCoordinator};
use sigbot::fees::FeeCalculator;
use sigbot::ingestion::{run_user_stream, StreamConfig, StreamStatus};
use sigbot::models::SignalEvent;
use sigbot::pricing::PriceService;
use sigbot::services::notifier::Notifier;
use sigbot::signals::SignalRouter;
use sigbot::sync::Scheduler;
use sigbot::venue::binance::BinanceFutures;
use sigbot::venue::kucoin::KucoinFutures;
use sigbot::venue::FuturesVenue;
use sigbot::{db, metrics, AppState};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls CryptoProvider");

    dotenvy::dotenv().ok();
    init_tracing();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Fatal configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Unrecoverable error");
        std::process::exit(2);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    // --- Prometheus metrics ---
    let metrics_handle = metrics::init_metrics();
    tracing::info!("Prometheus metrics initialized");

    tracing::info!("Connecting to database...");
    let db = db::init_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    // --- Telegram notifier ---
    let notifier: Option<Arc<Notifier>> = if config.notifications_enabled && config.has_telegram() {
        let n = Notifier::new(
            config.telegram_bot_token.clone().unwrap(),
            config.telegram_chat_id.clone().unwrap(),
        );
        tracing::info!("Telegram notifier enabled");
        Some(Arc::new(n))
    } else {
        tracing::info!("Telegram notifications disabled");
        None
    };

    // --- Venue selection: Binance primary, KuCoin secondary ---
    let venue: Arc<dyn FuturesVenue> = if config.has_binance_auth() {
        let client = BinanceFutures::new(
            config.binance_api_key.clone().unwrap(),
            config.binance_api_secret.clone().unwrap(),
            config.binance_testnet,
        )?;
        tracing::info!(testnet = config.binance_testnet, "Binance futures client initialized");
        Arc::new(client)
    } else if config.has_kucoin_auth() {
        let client = KucoinFutures::new(
            config.kucoin_api_key.clone().unwrap(),
            config.kucoin_api_secret.clone().unwrap(),
            config.kucoin_api_passphrase.clone().unwrap(),
        )?;
        tracing::info!("KuCoin futures client initialized");
        Arc::new(client)
    } else {
        eprintln!("Fatal: no venue credentials configured");
        std::process::exit(1);
    };

    // --- Trade coordinator ---
    let prices = PriceService::new(Arc::clone(&venue));
    let fees = FeeCalculator::new(config.fee_mode());
    let cooldowns = CooldownTracker::new(config.trade_cooldown, config.position_cooldown);
    let positions = PositionManager::new(PositionPolicy {
        max_position_trades: config.max_position_trades,
        ..PositionPolicy::default()
    });
    let engine_config = EngineConfig {
        trade_amount: config.trade_amount,
        min_trade_amount: config.min_trade_amount,
        max_trade_amount: config.max_trade_amount,
        leverage: config.leverage,
        price_threshold_pct: config.price_threshold_pct,
        memecoin_price_threshold_pct: config.memecoin_price_threshold_pct,
    };
    let coordinator = Arc::new(TradeCoordinator::new(
        db.clone(),
        Arc::clone(&venue),
        prices,
        fees,
        cooldowns,
        positions,
        engine_config,
        notifier.clone(),
    ));
    let mailboxes = Arc::new(SymbolMailboxes::new());

    // --- Ingress queue: API handlers → signal router ---
    let (signal_tx, mut signal_rx) = mpsc::channel::<SignalEvent>(500);
    {
        let router = SignalRouter::new(db.clone(), Arc::clone(&coordinator), Arc::clone(&mailboxes));
        tokio::spawn(async move {
            while let Some(event) = signal_rx.recv().await {
                if let Err(e) = router.route(event).await {
                    tracing::error!(error = %e, "Signal routing failed");
                }
            }
            tracing::warn!("Signal queue closed");
        });
    }

    // --- Periodic synchronizer ---
    let (sync_tx, sync_rx) = mpsc::channel::<&'static str>(16);
    let scheduler = Scheduler::new(db.clone(), Arc::clone(&venue), config.sync_intervals.clone());
    scheduler.spawn_all(sync_rx);

    // --- User-data stream ingestor ---
    let stream_status = Arc::new(StreamStatus::default());
    {
        let stream_venue = Arc::clone(&venue);
        let stream_pool = db.clone();
        let stream_config = StreamConfig {
            ping_interval: config.ping_interval,
            pong_timeout: config.pong_timeout,
            max_reconnect_attempts: config.max_reconnect_attempts,
        };
        let status = Arc::clone(&stream_status);
        tokio::spawn(async move {
            run_user_stream(stream_venue, stream_pool, stream_config, status, sync_tx).await;
        });
        tracing::info!("User-data stream ingestor spawned");
    }

    let state = AppState {
        db,
        config,
        signal_tx,
        metrics_handle,
        scheduler,
        stream_status,
        started_at: Instant::now(),
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown...");
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
