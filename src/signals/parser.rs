//! Structured-signal parsing. Upstream delivers either a pipe-delimited
//! pre-parsed form (`LIMIT|HYPE|Entry:|32.2-31.5|SL:|30.7`) or free text
//! (`HYPE long 32.2-31.5 SL 30.7 TP 33.5, 34.2 x1000`); both reduce to the
//! same `ParsedSignal` schema.

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{OrderKind, ParsedSignal, PositionType};

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no coin symbol found in signal")]
    MissingSymbol,

    #[error("no entry price found in signal")]
    MissingEntry,

    #[error("unparseable price token: {0}")]
    BadPrice(String),
}

/// Parse a signal, preferring the structured form when present.
pub fn parse_signal(content: &str, structured: Option<&str>) -> Result<ParsedSignal, ParseError> {
    if let Some(s) = structured {
        if !s.trim().is_empty() {
            return parse_structured(s);
        }
    }
    parse_free_text(content)
}

/// `ORDER_TYPE|SYMBOL|Entry:|<prices>|SL:|<price>[|TP:|<prices>][|LONG/SHORT]`
fn parse_structured(input: &str) -> Result<ParsedSignal, ParseError> {
    let segments: Vec<&str> = input.split('|').map(str::trim).collect();

    let mut order_type = OrderKind::Limit;
    let mut coin_symbol: Option<String> = None;
    let mut position_type: Option<PositionType> = None;
    let mut entry_prices: Vec<Decimal> = Vec::new();
    let mut stop_loss: Option<Decimal> = None;
    let mut take_profits: Vec<Decimal> = Vec::new();
    let mut quantity_multiplier: Option<u32> = None;

    let mut expect: Option<&str> = None;
    for segment in segments {
        if segment.is_empty() {
            continue;
        }
        match expect.take() {
            Some("entry") => {
                entry_prices = parse_price_list(segment)?;
                continue;
            }
            Some("sl") => {
                stop_loss = Some(parse_price(segment)?);
                continue;
            }
            Some("tp") => {
                take_profits = parse_price_list(segment)?;
                continue;
            }
            _ => {}
        }

        let upper = segment.to_uppercase();
        match upper.as_str() {
            "MARKET" => order_type = OrderKind::Market,
            "LIMIT" => order_type = OrderKind::Limit,
            "LONG" => position_type = Some(PositionType::Long),
            "SHORT" => position_type = Some(PositionType::Short),
            "ENTRY:" => expect = Some("entry"),
            "SL:" => expect = Some("sl"),
            "TP:" => expect = Some("tp"),
            _ => {
                if let Some(mult) = parse_multiplier(&upper) {
                    quantity_multiplier = Some(mult);
                } else if coin_symbol.is_none() && upper.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    coin_symbol = Some(upper);
                }
            }
        }
    }

    let coin_symbol = coin_symbol.ok_or(ParseError::MissingSymbol)?;
    if entry_prices.is_empty() {
        return Err(ParseError::MissingEntry);
    }
    let position_type =
        position_type.unwrap_or_else(|| infer_position_type(&entry_prices, stop_loss));

    Ok(ParsedSignal {
        coin_symbol,
        position_type,
        entry_prices,
        stop_loss,
        take_profits,
        order_type,
        quantity_multiplier,
    })
}

/// `HYPE long 32.2-31.5 SL 30.7 TP 33.5, 34.2 [x1000] [market]`
fn parse_free_text(content: &str) -> Result<ParsedSignal, ParseError> {
    let tokens: Vec<String> = content
        .split([' ', '\n', '\t'])
        .map(|t| t.trim_matches(|c: char| c == ',' || c == ':').to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let mut coin_symbol: Option<String> = None;
    let mut position_type: Option<PositionType> = None;
    let mut order_type = OrderKind::Limit;
    let mut entry_prices: Vec<Decimal> = Vec::new();
    let mut stop_loss: Option<Decimal> = None;
    let mut take_profits: Vec<Decimal> = Vec::new();
    let mut quantity_multiplier: Option<u32> = None;

    let mut collecting_tp = false;
    let mut expect_sl = false;
    for token in &tokens {
        let upper = token.to_uppercase();
        match upper.as_str() {
            "LONG" => {
                position_type = Some(PositionType::Long);
                collecting_tp = false;
                continue;
            }
            "SHORT" => {
                position_type = Some(PositionType::Short);
                collecting_tp = false;
                continue;
            }
            "MARKET" => {
                order_type = OrderKind::Market;
                continue;
            }
            "LIMIT" => {
                order_type = OrderKind::Limit;
                continue;
            }
            "SL" | "STOP" | "STOPLOSS" => {
                expect_sl = true;
                collecting_tp = false;
                continue;
            }
            "TP" | "TARGETS" | "TARGET" => {
                collecting_tp = true;
                continue;
            }
            _ => {}
        }

        if let Some(mult) = parse_multiplier(&upper) {
            quantity_multiplier = Some(mult);
            continue;
        }

        if let Ok(range) = parse_price_list(token) {
            if expect_sl {
                stop_loss = range.first().copied();
                expect_sl = false;
            } else if collecting_tp {
                take_profits.extend(range);
            } else if entry_prices.is_empty() {
                entry_prices = range;
            }
            continue;
        }

        if coin_symbol.is_none()
            && upper.len() >= 2
            && upper.len() <= 10
            && upper.chars().all(|c| c.is_ascii_alphanumeric())
            && upper.chars().any(|c| c.is_ascii_alphabetic())
        {
            coin_symbol = Some(upper);
        }
    }

    let coin_symbol = coin_symbol.ok_or(ParseError::MissingSymbol)?;
    if entry_prices.is_empty() {
        return Err(ParseError::MissingEntry);
    }
    let position_type =
        position_type.unwrap_or_else(|| infer_position_type(&entry_prices, stop_loss));

    Ok(ParsedSignal {
        coin_symbol,
        position_type,
        entry_prices,
        stop_loss,
        take_profits,
        order_type,
        quantity_multiplier,
    })
}

/// When the signal omits LONG/SHORT, a stop below the entry implies LONG.
fn infer_position_type(entries: &[Decimal], stop_loss: Option<Decimal>) -> PositionType {
    match (entries.first(), stop_loss) {
        (Some(entry), Some(sl)) if sl > *entry => PositionType::Short,
        _ => PositionType::Long,
    }
}

/// `x1000` / `1000X` style quantity multiplier tokens.
fn parse_multiplier(token: &str) -> Option<u32> {
    let digits = token.strip_prefix('X').or_else(|| token.strip_suffix('X'))?;
    let mult: u32 = digits.parse().ok()?;
    (mult >= 1).then_some(mult)
}

fn parse_price(token: &str) -> Result<Decimal, ParseError> {
    Decimal::from_str(token.trim_start_matches('$'))
        .map_err(|_| ParseError::BadPrice(token.to_string()))
}

/// One price, or a `-` separated pair for a range, or a comma list.
fn parse_price_list(token: &str) -> Result<Vec<Decimal>, ParseError> {
    let parts: Vec<&str> = token
        .split(['-', ','])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(ParseError::BadPrice(token.to_string()));
    }
    parts.iter().map(|p| parse_price(p)).collect()
}
