use rust_decimal::Decimal;

use crate::models::PositionType;

/// Fire-and-forget Telegram messages for trade lifecycle events. A delivery
/// problem is worth a log line, never a failed trade operation.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("https://api.telegram.org/bot{bot_token}/sendMessage"),
            chat_id,
        }
    }

    pub async fn send(&self, message: &str) {
        let result = self
            .http
            .post(&self.endpoint)
            .form(&[
                ("chat_id", self.chat_id.as_str()),
                ("text", message),
                ("parse_mode", "Markdown"),
            ])
            .send()
            .await;

        match result.and_then(|resp| resp.error_for_status()) {
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Telegram delivery failed"),
        }
    }
}

/// Format a trade-opened message.
pub fn format_trade_opened(
    coin_symbol: &str,
    position_type: PositionType,
    quantity: Decimal,
    entry_price: Decimal,
    breakeven_price: Decimal,
) -> String {
    format!(
        "*Trade Opened*\nSymbol: `{coin_symbol}`\nSide: {position_type}\nSize: {quantity} @ {entry_price}\nBreakeven: {breakeven_price}"
    )
}

/// Format a close/reduce message.
pub fn format_trade_closed(
    coin_symbol: &str,
    percent: Decimal,
    exit_price: Option<Decimal>,
    pnl: Option<Decimal>,
    reason: &str,
) -> String {
    let exit = exit_price
        .map(|p| p.to_string())
        .unwrap_or_else(|| "market".into());
    let pnl = pnl
        .map(|p| format!("{p} USDT"))
        .unwrap_or_else(|| "pending".into());
    format!(
        "*Position Reduced*\nSymbol: `{coin_symbol}`\nClosed: {percent}%\nExit: {exit}\nPnL: {pnl}\nReason: {reason}"
    )
}

/// Format a preflight/placement failure message.
pub fn format_trade_failed(trade_id: i64, reason: &str) -> String {
    format!("*Trade Failed*\nTrade: {trade_id}\nReason: {reason}")
}
