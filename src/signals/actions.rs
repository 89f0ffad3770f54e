//! Keyword classification of follow-up alerts. Plain substring matching over
//! normalized text; no model in the loop.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// New stop placement target for a stop-loss update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "price")]
pub enum StopTarget {
    /// Move the stop to the position's effective entry.
    BreakEven,
    Explicit(Decimal),
}

/// Action extracted from an alert's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum AlertAction {
    /// Stop loss was hit: close 100% at market.
    StopLossHit,
    /// Position closed manually: close 100% at market.
    PositionClosed,
    /// First target: close 50% at market.
    TakeProfit1,
    /// Second target: close the remaining 100% at market.
    TakeProfit2,
    /// Cancel current SL, place a new one.
    StopLossUpdate { target: StopTarget },
    /// TP1 hit and stop moved to entry in the same alert.
    Tp1AndBreakEven,
    /// Cancel the pending entry order.
    OrderCancelled,
    /// Entry limit order filled; informational.
    OrderFilled,
    /// Entry limit order still resting; informational.
    OrderNotFilled,
    Unknown,
}

impl AlertAction {
    /// Percentage of the live position this action closes, when it closes.
    pub fn close_percent(&self) -> Option<Decimal> {
        match self {
            AlertAction::StopLossHit | AlertAction::PositionClosed | AlertAction::TakeProfit2 => {
                Some(Decimal::ONE_HUNDRED)
            }
            AlertAction::TakeProfit1 | AlertAction::Tp1AndBreakEven => Some(Decimal::from(50)),
            _ => None,
        }
    }
}

impl fmt::Display for AlertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertAction::StopLossHit => "stop_loss_hit",
            AlertAction::PositionClosed => "position_closed",
            AlertAction::TakeProfit1 => "take_profit_1",
            AlertAction::TakeProfit2 => "take_profit_2",
            AlertAction::StopLossUpdate { .. } => "stop_loss_update",
            AlertAction::Tp1AndBreakEven => "tp1_and_break_even",
            AlertAction::OrderCancelled => "order_cancelled",
            AlertAction::OrderFilled => "order_filled",
            AlertAction::OrderNotFilled => "order_not_filled",
            AlertAction::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Window (in characters) within which "be"/"breakeven" after a stop keyword
/// reads as a breakeven move rather than a stop-out.
const BREAKEVEN_WINDOW: usize = 24;

pub fn classify_alert(content: &str) -> AlertAction {
    let text = normalize(content);

    // Combined "tp1 & stops to be" first so neither half wins alone.
    let mentions_tp1 = text.contains("tp1") || text.contains("take profit 1");
    if mentions_tp1 && mentions_breakeven_move(&text) {
        return AlertAction::Tp1AndBreakEven;
    }

    // Stop-loss updates outrank stop-outs when breakeven language is near
    // the stop keyword.
    if mentions_breakeven_move(&text) {
        return AlertAction::StopLossUpdate {
            target: StopTarget::BreakEven,
        };
    }
    if let Some(price) = explicit_stop_move(&text) {
        return AlertAction::StopLossUpdate {
            target: StopTarget::Explicit(price),
        };
    }

    if text.contains("stopped out")
        || text.contains("stop loss hit")
        || text.contains("sl hit")
        || text.contains("stopped at")
    {
        return AlertAction::StopLossHit;
    }

    if mentions_tp1 {
        return AlertAction::TakeProfit1;
    }
    if text.contains("tp2") || text.contains("take profit 2") {
        return AlertAction::TakeProfit2;
    }

    if text.contains("limit order cancelled")
        || text.contains("limit order canceled")
        || text.contains("order cancelled")
        || text.contains("order canceled")
    {
        return AlertAction::OrderCancelled;
    }
    if text.contains("order filled") {
        return AlertAction::OrderFilled;
    }
    if text.contains("not filled") || text.contains("wasn't filled") || text.contains("still valid")
    {
        return AlertAction::OrderNotFilled;
    }

    if text.contains("closed") {
        return AlertAction::PositionClosed;
    }

    AlertAction::Unknown
}

/// Strip zero-width characters and collapse whitespace before matching.
fn normalize(content: &str) -> String {
    let stripped: String = content
        .chars()
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// "stops moved to be", "sl to be", "stopped be": breakeven language close
/// to a stop keyword.
fn mentions_breakeven_move(text: &str) -> bool {
    for keyword in ["stops", "stop", "sl"] {
        let mut search_from = 0;
        while let Some(pos) = text[search_from..].find(keyword) {
            let start = search_from + pos + keyword.len();
            let mut window_end = (start + BREAKEVEN_WINDOW).min(text.len());
            while !text.is_char_boundary(window_end) {
                window_end += 1;
            }
            let window = &text[start..window_end];
            if contains_word(window, "be") || window.contains("breakeven") || window.contains("break even")
            {
                return true;
            }
            search_from = start;
        }
    }
    false
}

/// "stops moved to 31.4": a stop move with an explicit price.
fn explicit_stop_move(text: &str) -> Option<Decimal> {
    let moved = text.find("stops moved to").map(|p| p + "stops moved to".len())
        .or_else(|| text.find("stop loss updated to").map(|p| p + "stop loss updated to".len()))
        .or_else(|| text.find("move stops to").map(|p| p + "move stops to".len()))?;
    let rest = text[moved..].trim_start();
    let token: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Decimal::from_str(&token).ok()
}

/// Whole-word containment so "be" does not match inside "before".
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.split(|c: char| !c.is_ascii_alphanumeric()).any(|w| w == word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_out_is_a_full_close() {
        let action = classify_alert("HYPE stopped out");
        assert_eq!(action, AlertAction::StopLossHit);
        assert_eq!(action.close_percent(), Some(Decimal::ONE_HUNDRED));
    }

    #[test]
    fn tp1_closes_half() {
        let action = classify_alert(" ETH \u{2060}🚀｜trades\u{2060}: tp1 hit");
        assert_eq!(action, AlertAction::TakeProfit1);
        assert_eq!(action.close_percent(), Some(Decimal::from(50)));
    }

    #[test]
    fn tp2_closes_remainder() {
        let action = classify_alert("SOL tp2 hit, well done");
        assert_eq!(action, AlertAction::TakeProfit2);
        assert_eq!(action.close_percent(), Some(Decimal::ONE_HUNDRED));
    }

    #[test]
    fn stops_moved_to_be_is_an_update() {
        assert_eq!(
            classify_alert("stops moved to be"),
            AlertAction::StopLossUpdate {
                target: StopTarget::BreakEven
            }
        );
    }

    #[test]
    fn sl_to_be_is_an_update() {
        assert_eq!(
            classify_alert("BTC sl to be"),
            AlertAction::StopLossUpdate {
                target: StopTarget::BreakEven
            }
        );
    }

    #[test]
    fn stopped_be_prefers_update_over_stop_out() {
        // Breakeven language near the stop keyword wins the ambiguity.
        assert_eq!(
            classify_alert("HYPE stopped be"),
            AlertAction::StopLossUpdate {
                target: StopTarget::BreakEven
            }
        );
    }

    #[test]
    fn be_does_not_match_inside_longer_words() {
        assert_eq!(
            classify_alert("stopped out before the bounce"),
            AlertAction::StopLossHit
        );
    }

    #[test]
    fn explicit_stop_price_is_extracted() {
        assert_eq!(
            classify_alert("ETH stops moved to 2540.5"),
            AlertAction::StopLossUpdate {
                target: StopTarget::Explicit(Decimal::from_str("2540.5").unwrap())
            }
        );
    }

    #[test]
    fn combined_tp1_and_breakeven() {
        assert_eq!(
            classify_alert("HYPE tp1 & stops moved to be"),
            AlertAction::Tp1AndBreakEven
        );
    }

    #[test]
    fn limit_order_cancelled() {
        assert_eq!(
            classify_alert("HYPE limit order cancelled"),
            AlertAction::OrderCancelled
        );
    }

    #[test]
    fn closed_is_a_full_close() {
        assert_eq!(
            classify_alert("position closed in profit"),
            AlertAction::PositionClosed
        );
    }

    #[test]
    fn gibberish_is_unknown() {
        assert_eq!(classify_alert("gm everyone"), AlertAction::Unknown);
    }
}
