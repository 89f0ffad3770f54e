use rust_decimal::Decimal;
use std::env;
use std::time::Duration;

use crate::fees::FeeMode;
use crate::sync::SyncIntervals;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    // Binance USDⓈ-M credentials (primary venue)
    pub binance_api_key: Option<String>,
    pub binance_api_secret: Option<String>,
    pub binance_testnet: bool,

    // KuCoin Futures credentials (secondary venue)
    pub kucoin_api_key: Option<String>,
    pub kucoin_api_secret: Option<String>,
    pub kucoin_api_passphrase: Option<String>,

    // Sizing
    pub trade_amount: Decimal,
    pub min_trade_amount: Decimal,
    pub max_trade_amount: Decimal,
    pub leverage: u32,

    // Preflight gates
    pub price_threshold_pct: Decimal,
    pub memecoin_price_threshold_pct: Decimal,
    pub trade_cooldown: Duration,
    pub position_cooldown: Duration,
    pub max_position_trades: usize,

    // Fees
    pub use_fixed_fee_calculator: bool,
    pub fixed_fee_rate: Decimal,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
    pub bnb_fee_discount: bool,

    // User-data stream
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub max_reconnect_attempts: u32,

    // Scheduler
    pub sync_intervals: SyncIntervals,

    // Notifications
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub notifications_enabled: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT").unwrap_or_else(|_| "8080".into()).parse()?,

            binance_api_key: env::var("BINANCE_API_KEY").ok(),
            binance_api_secret: env::var("BINANCE_API_SECRET").ok(),
            binance_testnet: env_bool("BINANCE_TESTNET", false),

            kucoin_api_key: env::var("KUCOIN_API_KEY").ok(),
            kucoin_api_secret: env::var("KUCOIN_API_SECRET").ok(),
            kucoin_api_passphrase: env::var("KUCOIN_API_PASSPHRASE").ok(),

            trade_amount: env_decimal("TRADE_AMOUNT", "101.0"),
            min_trade_amount: env_decimal("MIN_TRADE_AMOUNT", "10"),
            max_trade_amount: env_decimal("MAX_TRADE_AMOUNT", "1000"),
            leverage: env_parse("LEVERAGE", 1),

            price_threshold_pct: env_decimal("PRICE_THRESHOLD", "2.0"),
            memecoin_price_threshold_pct: env_decimal("MEMECOIN_PRICE_THRESHOLD", "5.0"),
            trade_cooldown: Duration::from_secs(env_parse("TRADE_COOLDOWN", 300)),
            position_cooldown: Duration::from_secs(env_parse("POSITION_COOLDOWN", 600)),
            max_position_trades: env_parse("MAX_POSITION_TRADES", 3),

            use_fixed_fee_calculator: env_bool("USE_FIXED_FEE_CALCULATOR", true),
            fixed_fee_rate: env_decimal("FIXED_FEE_RATE", "0.0002"),
            maker_fee_rate: env_decimal("MAKER_FEE_RATE", "0.0002"),
            taker_fee_rate: env_decimal("TAKER_FEE_RATE", "0.0005"),
            bnb_fee_discount: env_bool("BNB_FEE_DISCOUNT", true),

            ping_interval: Duration::from_secs(env_parse("PING_INTERVAL", 180)),
            pong_timeout: Duration::from_secs(env_parse("PONG_TIMEOUT", 600)),
            max_reconnect_attempts: env_parse("MAX_RECONNECT_ATTEMPTS", 10),

            sync_intervals: SyncIntervals {
                status_sync: Duration::from_secs(env_parse("STATUS_SYNC_INTERVAL_SECS", 1440)),
                pnl_backfill: Duration::from_secs(env_parse("PNL_BACKFILL_INTERVAL_SECS", 3600)),
                orphan_cleanup: Duration::from_secs(env_parse(
                    "ORPHAN_CLEANUP_INTERVAL_SECS",
                    7200,
                )),
                balance_sync: Duration::from_secs(env_parse("BALANCE_SYNC_INTERVAL_SECS", 300)),
                position_audit: Duration::from_secs(env_parse(
                    "POSITION_AUDIT_INTERVAL_SECS",
                    300,
                )),
            },

            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN").ok(),
            telegram_chat_id: env::var("TELEGRAM_CHAT_ID").ok(),
            notifications_enabled: env_bool("NOTIFICATIONS_ENABLED", false),
        })
    }

    pub fn has_binance_auth(&self) -> bool {
        self.binance_api_key.is_some() && self.binance_api_secret.is_some()
    }

    pub fn has_kucoin_auth(&self) -> bool {
        self.kucoin_api_key.is_some()
            && self.kucoin_api_secret.is_some()
            && self.kucoin_api_passphrase.is_some()
    }

    pub fn has_telegram(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }

    /// The single deterministic fee mode for this run.
    pub fn fee_mode(&self) -> FeeMode {
        if self.use_fixed_fee_calculator {
            FeeMode::Fixed {
                rate: self.fixed_fee_rate,
            }
        } else {
            FeeMode::Tiered {
                maker_rate: self.maker_fee_rate,
                taker_rate: self.taker_fee_rate,
                bnb_discount: self.bnb_fee_discount,
            }
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_decimal(key: &str, default: &str) -> Decimal {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| default.parse().expect("default decimal parses"))
}
