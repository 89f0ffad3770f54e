//! Trade coordinator: open/close/update primitives with preflight checks.
//! All mutating operations for one coin symbol are serialized through the
//! symbol's mailbox; the coordinator itself assumes it is never re-entered
//! for the same symbol.

pub mod cooldown;
pub mod mailbox;
pub mod position_manager;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;
use thiserror::Error;

use crate::db::trade_repo;
use crate::fees::{target_quantity, FeeCalculator};
use crate::models::trade::ProtectiveKind;
use crate::models::{OrderKind, ParsedSignal, PositionType, TpSlOrder, Trade, TradeStatus};
use crate::pricing::{price_deviation_pct, PriceService};
use crate::services::notifier::{self, Notifier};
use crate::signals::actions::{AlertAction, StopTarget};
use crate::venue::{FuturesVenue, OrderRequest, VenueError};

use cooldown::{CooldownTracker, CooldownVerdict};
use position_manager::{merged_position, ConflictDecision, PositionManager};

/// How long a REPLACE waits for the old position to flatten before opening
/// the new one.
const REPLACE_CONFIRM_ATTEMPTS: u32 = 20;
const REPLACE_CONFIRM_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("trade {0} not found")]
    TradeNotFound(i64),

    #[error("trade {0} carries no parsed signal")]
    MissingSignal(i64),

    #[error("trade {trade_id} rejected: {reason}")]
    Rejected {
        trade_id: i64,
        status: TradeStatus,
        reason: String,
    },

    #[error("no live position for trade {0}")]
    NoPosition(i64),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub trade_amount: Decimal,
    pub min_trade_amount: Decimal,
    pub max_trade_amount: Decimal,
    pub leverage: u32,
    /// Max |signal − market| / market for regular symbols, percent.
    pub price_threshold_pct: Decimal,
    /// Wider bound for memecoin-style signals (quantity multiplier present).
    pub memecoin_price_threshold_pct: Decimal,
}

/// Result of a successful open, with the fee preview attached.
#[derive(Debug, Clone)]
pub struct OpenResult {
    pub order_id: String,
    pub quantity: Decimal,
    pub entry_price: Option<Decimal>,
    pub expected_fees: Decimal,
    pub breakeven_price: Decimal,
    pub merged_into: Option<i64>,
}

pub struct TradeCoordinator {
    pool: PgPool,
    venue: Arc<dyn FuturesVenue>,
    prices: PriceService,
    fees: FeeCalculator,
    cooldowns: CooldownTracker,
    positions: PositionManager,
    config: EngineConfig,
    notifier: Option<Arc<Notifier>>,
}

impl TradeCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        venue: Arc<dyn FuturesVenue>,
        prices: PriceService,
        fees: FeeCalculator,
        cooldowns: CooldownTracker,
        positions: PositionManager,
        config: EngineConfig,
        notifier: Option<Arc<Notifier>>,
    ) -> Self {
        Self {
            pool,
            venue,
            prices,
            fees,
            cooldowns,
            positions,
            config,
            notifier,
        }
    }

    // -----------------------------------------------------------------------
    // open_position
    // -----------------------------------------------------------------------

    pub async fn open_position(&self, trade_id: i64) -> Result<OpenResult, EngineError> {
        let trade = self.load(trade_id).await?;
        let signal = trade
            .parsed_signal()
            .ok_or(EngineError::MissingSignal(trade_id))?;
        let coin_symbol = signal.coin_symbol.clone();

        // 1. Cooldown, extended when a position already exists.
        let open_trades = trade_repo::open_trades_for_symbol(&self.pool, &coin_symbol).await?;
        let has_position = open_trades.iter().any(|t| t.status().has_position());
        if let CooldownVerdict::Blocked(remaining) = self.cooldowns.check(&coin_symbol, has_position)
        {
            return self
                .reject(
                    trade_id,
                    TradeStatus::Failed,
                    format!("cooldown active for {}s", remaining.as_secs()),
                )
                .await;
        }
        self.cooldowns.stamp(&coin_symbol);

        // Position-manager conflict resolution before any venue call.
        let decision = self.positions.resolve(signal.position_type, &open_trades);
        let merge_primary = match decision {
            ConflictDecision::Proceed => None,
            ConflictDecision::Merge { primary_id } => Some(primary_id),
            ConflictDecision::Replace { existing_id } => {
                tracing::info!(
                    trade_id,
                    existing_id,
                    symbol = %coin_symbol,
                    "Opposite-side position open — replacing"
                );
                self.close_position(existing_id, Decimal::ONE_HUNDRED, "replaced by new signal")
                    .await?;
                self.wait_for_flat(&coin_symbol).await?;
                None
            }
            ConflictDecision::Reject { reason } => {
                return self.reject(trade_id, TradeStatus::Failed, reason).await;
            }
        };

        // 2. Symbol support.
        let pair = self.venue.trading_pair(&coin_symbol);
        match self.venue.is_symbol_supported(&pair).await {
            Ok(true) => {}
            Ok(false) => {
                return self
                    .reject(
                        trade_id,
                        TradeStatus::Failed,
                        format!("symbol {pair} not supported"),
                    )
                    .await;
            }
            Err(err) => return Err(self.fail_on_terminal(trade_id, err).await),
        }

        // 3. Reference price.
        let mark_price = match self.prices.reference_price(&pair).await {
            Ok(p) => p,
            Err(err) => return Err(self.fail_on_terminal(trade_id, err).await),
        };

        // 4. Price-proximity gate.
        let threshold = if signal.quantity_multiplier.is_some() {
            self.config.memecoin_price_threshold_pct
        } else {
            self.config.price_threshold_pct
        };
        let gate_price = match signal.order_type {
            OrderKind::Limit => signal.limit_entry_price(),
            OrderKind::Market => signal.entry_prices.first().copied(),
        };
        if let Some(signal_price) = gate_price {
            if let Some(deviation) = price_deviation_pct(signal_price, mark_price) {
                if deviation > threshold {
                    return self
                        .reject(
                            trade_id,
                            TradeStatus::Failed,
                            format!(
                                "price out of range: signal {signal_price} vs market {mark_price} ({deviation:.2}% > {threshold}%)"
                            ),
                        )
                        .await;
                }
            }
        }

        // 5. Sizing.
        let notional = self
            .config
            .trade_amount
            .clamp(self.config.min_trade_amount, self.config.max_trade_amount);
        let Some(raw_qty) = target_quantity(notional, mark_price, signal.quantity_multiplier)
        else {
            return self
                .reject(trade_id, TradeStatus::Failed, "reference price is zero".into())
                .await;
        };

        // 6. Precision clamp.
        let filters = match self.venue.symbol_filters(&pair).await {
            Ok(f) => f,
            Err(err) => return Err(self.fail_on_terminal(trade_id, err).await),
        };
        let quantity = filters.quantize_qty(raw_qty);
        let limit_price = signal.limit_entry_price().map(|p| filters.quantize_price(p));
        let check_price = match signal.order_type {
            OrderKind::Limit => limit_price.unwrap_or(mark_price),
            OrderKind::Market => mark_price,
        };
        if let Err(violation) = filters.validate(quantity, check_price) {
            return self
                .reject(trade_id, TradeStatus::Failed, violation.to_string())
                .await;
        }

        // 7. Leverage binding.
        if let Err(err) = self.venue.change_leverage(&pair, self.config.leverage).await {
            return Err(self.fail_on_terminal(trade_id, err).await);
        }

        // 8. Fee preview.
        let expected_fees = self.fees.total_fee(notional, signal.order_type == OrderKind::Market);
        let breakeven_price = self.fees.breakeven_price(
            check_price,
            signal.position_type,
            signal.order_type == OrderKind::Market,
        );

        // 9. Placement. Success is the venue-assigned orderId, independent of
        // any later probe.
        let side = signal.position_type.entry_side();
        let request = match signal.order_type {
            OrderKind::Market => OrderRequest::market(&pair, side, quantity),
            OrderKind::Limit => OrderRequest::limit(
                &pair,
                side,
                quantity,
                limit_price.unwrap_or(check_price),
            ),
        };
        let ack = match self.venue.place_order(&request).await {
            Ok(ack) => ack,
            Err(err) => {
                counter!("orders_failed").increment(1);
                return Err(self.fail_on_terminal(trade_id, err).await);
            }
        };
        counter!("orders_placed").increment(1);

        // 11 (persist placement before protective orders so a crash between
        // the two still leaves the orderId on record).
        let (status, position_size, entry_price) = match signal.order_type {
            OrderKind::Market if ack.executed_qty.is_zero() => {
                (TradeStatus::Unfilled, quantity, ack.avg_price)
            }
            OrderKind::Market => (TradeStatus::Open, ack.executed_qty, ack.avg_price),
            // LIMIT rests on the book; the fill event moves it to OPEN.
            OrderKind::Limit => (TradeStatus::Pending, quantity, limit_price),
        };
        let created_at = (status == TradeStatus::Open).then(Utc::now);
        trade_repo::record_placement(
            &self.pool,
            trade_id,
            &ack.raw,
            &ack.order_id,
            position_size,
            entry_price,
            status,
            created_at,
        )
        .await?;

        // 10. Protective orders.
        let tp_sl = self
            .install_protective_orders(&pair, &signal, quantity, filters.tick_size)
            .await;
        match tp_sl {
            Ok(orders) => {
                let payload = serde_json::to_value(&orders).unwrap_or_else(|_| json!([]));
                trade_repo::set_tp_sl_orders(&self.pool, trade_id, &payload).await?;
            }
            Err(err) => {
                tracing::warn!(trade_id, error = %err, "Failed to install protective orders");
                trade_repo::increment_sync_error(
                    &self.pool,
                    trade_id,
                    &format!("protective orders failed: {err}"),
                )
                .await?;
            }
        }

        // Post-placement status probe. Failures never touch the placement
        // record; they only bump sync_error_count.
        match self.venue.order_status(&pair, &ack.order_id).await {
            Ok(info) => {
                trade_repo::record_status_probe(&self.pool, trade_id, &info.raw).await?;
            }
            Err(err) => {
                tracing::warn!(trade_id, error = %err, "Post-placement status probe failed");
                trade_repo::increment_sync_error(
                    &self.pool,
                    trade_id,
                    &format!("status probe failed: {err}"),
                )
                .await?;
            }
        }

        // Merge bookkeeping after a same-side addition.
        let mut merged_into = None;
        if let Some(primary_id) = merge_primary {
            if let Some(primary) = trade_repo::find_by_id(&self.pool, primary_id).await? {
                let fill_price = entry_price.unwrap_or(mark_price);
                if let Some((entry, size)) = merged_position(
                    primary.effective_entry_price().unwrap_or(fill_price),
                    primary.position_size.unwrap_or(Decimal::ZERO),
                    fill_price,
                    position_size,
                ) {
                    trade_repo::apply_merge_to_primary(&self.pool, primary_id, entry, size).await?;
                    trade_repo::mark_merged(&self.pool, trade_id, primary_id, "same-side addition")
                        .await?;
                    merged_into = Some(primary_id);
                }
            }
        }

        if let Some(n) = &self.notifier {
            n.send(&notifier::format_trade_opened(
                &coin_symbol,
                signal.position_type,
                quantity,
                entry_price.unwrap_or(mark_price),
                breakeven_price,
            ))
            .await;
        }

        Ok(OpenResult {
            order_id: ack.order_id,
            quantity,
            entry_price,
            expected_fees,
            breakeven_price,
            merged_into,
        })
    }

    // -----------------------------------------------------------------------
    // close_position
    // -----------------------------------------------------------------------

    /// Close `percent` of the live position at market with a reduce-only
    /// order. A venue-flat position marks the row CLOSED and reports the
    /// condition in the returned payload.
    pub async fn close_position(
        &self,
        trade_id: i64,
        percent: Decimal,
        reason: &str,
    ) -> Result<Value, EngineError> {
        let trade = self.load(trade_id).await?;
        let position_type = trade
            .position_type()
            .ok_or(EngineError::MissingSignal(trade_id))?;
        let coin_symbol = trade
            .coin_symbol
            .clone()
            .ok_or(EngineError::MissingSignal(trade_id))?;
        let pair = self.venue.trading_pair(&coin_symbol);

        let live_size = self.venue_position_size(&pair).await?;
        if live_size.is_zero() {
            trade_repo::record_close(
                &self.pool,
                trade_id,
                TradeStatus::Closed,
                None,
                None,
                Decimal::ZERO,
                Some(Utc::now()),
            )
            .await?;
            return Ok(json!({ "error": "position already closed" }));
        }

        let filters = self.venue.symbol_filters(&pair).await?;
        let target = live_size * percent / Decimal::ONE_HUNDRED;
        let quantity = filters.quantize_qty(target);
        if quantity.is_zero() {
            return Err(EngineError::NoPosition(trade_id));
        }

        let request =
            OrderRequest::market(&pair, position_type.exit_side(), quantity).reduce_only();
        let ack = self.venue.place_order(&request).await?;
        counter!("orders_placed").increment(1);

        let remaining = (live_size - quantity).max(Decimal::ZERO);
        let full_close = percent >= Decimal::ONE_HUNDRED || remaining < filters.step_size;
        let exit_price = ack.avg_price.or(self.prices.reference_price(&pair).await.ok());

        let pnl = match (trade.effective_entry_price(), exit_price) {
            (Some(entry), Some(exit)) => {
                let direction = match position_type {
                    PositionType::Long => Decimal::ONE,
                    PositionType::Short => Decimal::NEGATIVE_ONE,
                };
                Some((exit - entry) * quantity * direction)
            }
            _ => None,
        };

        let status = if full_close {
            TradeStatus::Closed
        } else {
            TradeStatus::PartiallyClosed
        };
        trade_repo::record_close(
            &self.pool,
            trade_id,
            status,
            exit_price,
            pnl,
            if full_close { Decimal::ZERO } else { remaining },
            Some(Utc::now()),
        )
        .await?;

        tracing::info!(
            trade_id,
            symbol = %coin_symbol,
            percent = %percent,
            reason,
            status = %status,
            "Position reduced"
        );
        if let Some(n) = &self.notifier {
            n.send(&notifier::format_trade_closed(
                &coin_symbol,
                percent,
                exit_price,
                pnl,
                reason,
            ))
            .await;
        }

        Ok(ack.raw)
    }

    // -----------------------------------------------------------------------
    // update_stop_loss
    // -----------------------------------------------------------------------

    /// Cancel every resting protective stop for the symbol, then place a
    /// fresh SL. The venue cannot amend in place, so update = cancel+create.
    pub async fn update_stop_loss(
        &self,
        trade_id: i64,
        target: StopTarget,
    ) -> Result<Value, EngineError> {
        let trade = self.load(trade_id).await?;
        let position_type = trade
            .position_type()
            .ok_or(EngineError::MissingSignal(trade_id))?;
        let coin_symbol = trade
            .coin_symbol
            .clone()
            .ok_or(EngineError::MissingSignal(trade_id))?;
        let pair = self.venue.trading_pair(&coin_symbol);

        // Cancel current stops.
        let open_orders = self.venue.open_orders(Some(&pair)).await?;
        for order in open_orders.iter().filter(|o| {
            o.is_protective() && o.order_type.contains("STOP")
        }) {
            if let Err(err) = self.venue.cancel_order(&pair, &order.order_id).await {
                tracing::warn!(
                    trade_id,
                    order_id = %order.order_id,
                    error = %err,
                    "Failed to cancel stale stop order"
                );
            }
        }

        // Fresh position size; a flat position means nothing to protect.
        let live_size = self.venue_position_size(&pair).await?;
        if live_size.is_zero() {
            return Err(EngineError::NoPosition(trade_id));
        }

        let filters = self.venue.symbol_filters(&pair).await?;
        let new_price = match target {
            StopTarget::Explicit(price) => filters.quantize_price(price),
            StopTarget::BreakEven => filters.quantize_price(
                trade
                    .effective_entry_price()
                    .ok_or(EngineError::NoPosition(trade_id))?,
            ),
        };

        let ack = self
            .place_stop(&pair, position_type, new_price, live_size)
            .await?;

        // Keep surviving TPs, swap in the new SL.
        let mut orders: Vec<TpSlOrder> = trade
            .tp_sl_orders()
            .into_iter()
            .filter(|o| o.kind == ProtectiveKind::Tp)
            .collect();
        orders.push(TpSlOrder {
            order_id: ack.order_id.clone(),
            kind: ProtectiveKind::Sl,
            trigger_price: new_price,
            level: None,
        });
        let payload = serde_json::to_value(&orders).unwrap_or_else(|_| json!([]));
        trade_repo::set_tp_sl_orders(&self.pool, trade_id, &payload).await?;

        tracing::info!(trade_id, symbol = %coin_symbol, stop = %new_price, "Stop loss updated");
        Ok(ack.raw)
    }

    /// Cancel the resting entry order for a trade that never filled.
    pub async fn cancel_entry(&self, trade_id: i64) -> Result<Value, EngineError> {
        let trade = self.load(trade_id).await?;
        let coin_symbol = trade
            .coin_symbol
            .clone()
            .ok_or(EngineError::MissingSignal(trade_id))?;
        let order_id = trade
            .exchange_order_id
            .clone()
            .ok_or(EngineError::NoPosition(trade_id))?;
        let pair = self.venue.trading_pair(&coin_symbol);

        let response = match self.venue.cancel_order(&pair, &order_id).await {
            Ok(resp) => resp,
            Err(VenueError::OrderNotFound(msg)) => {
                // Already gone on the venue: filled earlier or expired. The
                // status probe decides which.
                tracing::info!(trade_id, %order_id, "Entry order already gone: {msg}");
                json!({ "warning": "order not found", "detail": msg })
            }
            Err(err) => return Err(err.into()),
        };

        trade_repo::record_close(
            &self.pool,
            trade_id,
            TradeStatus::Canceled,
            None,
            None,
            Decimal::ZERO,
            None,
        )
        .await?;
        Ok(response)
    }

    // -----------------------------------------------------------------------
    // Alert dispatch
    // -----------------------------------------------------------------------

    /// Apply a classified follow-up action to its parent trade.
    pub async fn apply_alert(
        &self,
        trade_id: i64,
        action: &AlertAction,
    ) -> Result<Value, EngineError> {
        match action {
            AlertAction::StopLossHit => {
                self.close_position(trade_id, Decimal::ONE_HUNDRED, "stop loss hit")
                    .await
            }
            AlertAction::PositionClosed => {
                self.close_position(trade_id, Decimal::ONE_HUNDRED, "position closed")
                    .await
            }
            AlertAction::TakeProfit1 => {
                self.close_position(trade_id, Decimal::from(50), "tp1 hit").await
            }
            AlertAction::TakeProfit2 => {
                self.close_position(trade_id, Decimal::ONE_HUNDRED, "tp2 hit")
                    .await
            }
            AlertAction::StopLossUpdate { target } => {
                self.update_stop_loss(trade_id, *target).await
            }
            AlertAction::Tp1AndBreakEven => {
                let close = self
                    .close_position(trade_id, Decimal::from(50), "tp1 hit")
                    .await?;
                let stop = self
                    .update_stop_loss(trade_id, StopTarget::BreakEven)
                    .await?;
                Ok(json!({ "close": close, "stop_update": stop }))
            }
            AlertAction::OrderCancelled => self.cancel_entry(trade_id).await,
            AlertAction::OrderFilled | AlertAction::OrderNotFilled | AlertAction::Unknown => {
                Ok(json!({ "action": action.to_string(), "applied": false }))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn load(&self, trade_id: i64) -> Result<Trade, EngineError> {
        trade_repo::find_by_id(&self.pool, trade_id)
            .await?
            .ok_or(EngineError::TradeNotFound(trade_id))
    }

    async fn reject<T>(
        &self,
        trade_id: i64,
        status: TradeStatus,
        reason: String,
    ) -> Result<T, EngineError> {
        tracing::warn!(trade_id, status = %status, %reason, "Trade rejected in preflight");
        counter!("trades_rejected").increment(1);
        trade_repo::mark_failed(&self.pool, trade_id, status, &reason).await?;
        if let Some(n) = &self.notifier {
            n.send(&notifier::format_trade_failed(trade_id, &reason)).await;
        }
        Err(EngineError::Rejected {
            trade_id,
            status,
            reason,
        })
    }

    /// Terminal placement failures move the row to FAILED; everything else
    /// (transient, permission) leaves the row alone and surfaces the error.
    async fn fail_on_terminal(&self, trade_id: i64, err: VenueError) -> EngineError {
        if err.is_terminal_placement_failure() {
            let reason = err.to_string();
            if let Err(db_err) =
                trade_repo::mark_failed(&self.pool, trade_id, TradeStatus::Failed, &reason).await
            {
                tracing::error!(trade_id, error = %db_err, "Failed to persist FAILED status");
            }
            counter!("trades_rejected").increment(1);
            if let Some(n) = &self.notifier {
                n.send(&notifier::format_trade_failed(trade_id, &reason)).await;
            }
        }
        EngineError::Venue(err)
    }

    async fn venue_position_size(&self, pair: &str) -> Result<Decimal, EngineError> {
        let positions = self.venue.position_risk(Some(pair)).await?;
        Ok(positions
            .iter()
            .find(|p| p.symbol == pair)
            .map(|p| p.position_amt.abs())
            .unwrap_or(Decimal::ZERO))
    }

    /// Poll until the venue reports a flat position, bounded. The user-data
    /// stream confirms faster in practice; this is the fallback.
    async fn wait_for_flat(&self, coin_symbol: &str) -> Result<(), EngineError> {
        let pair = self.venue.trading_pair(coin_symbol);
        for _ in 0..REPLACE_CONFIRM_ATTEMPTS {
            if self.venue_position_size(&pair).await?.is_zero() {
                return Ok(());
            }
            tokio::time::sleep(REPLACE_CONFIRM_DELAY).await;
        }
        Err(EngineError::Venue(VenueError::Transient(format!(
            "position on {pair} did not flatten after replace"
        ))))
    }

    async fn install_protective_orders(
        &self,
        pair: &str,
        signal: &ParsedSignal,
        quantity: Decimal,
        tick_size: Decimal,
    ) -> Result<Vec<TpSlOrder>, VenueError> {
        let mut orders = Vec::new();
        let exit_side = signal.position_type.exit_side();

        // Prefer the venue's position-mode TP/SL; fall back to separate
        // reduce-only orders when the venue has no such mode.
        let position_mode = match self.venue.change_position_tpsl_mode(pair, true).await {
            Ok(()) => true,
            Err(VenueError::SymbolUnsupported(_)) => false,
            Err(err) => {
                tracing::warn!(pair, error = %err, "TP/SL mode change failed; using reduce-only");
                false
            }
        };

        if let Some(stop_loss) = signal.stop_loss {
            let price = quantize_tick(stop_loss, tick_size);
            let mut request = OrderRequest::stop_market(pair, exit_side, price);
            if !position_mode {
                request.close_position = false;
                request.quantity = Some(quantity);
                request.reduce_only = true;
            }
            let ack = self.venue.place_order(&request).await?;
            orders.push(TpSlOrder {
                order_id: ack.order_id,
                kind: ProtectiveKind::Sl,
                trigger_price: price,
                level: None,
            });
        }

        for (index, take_profit) in signal.take_profits.iter().enumerate() {
            let price = quantize_tick(*take_profit, tick_size);
            let mut request = OrderRequest::take_profit_market(pair, exit_side, price);
            if !position_mode {
                request.close_position = false;
                // TP1 takes half, the last level the remainder.
                let share = if index + 1 < signal.take_profits.len() {
                    quantity / Decimal::TWO
                } else {
                    quantity
                };
                request.quantity = Some(share);
                request.reduce_only = true;
            }
            let ack = self.venue.place_order(&request).await?;
            orders.push(TpSlOrder {
                order_id: ack.order_id,
                kind: ProtectiveKind::Tp,
                trigger_price: price,
                level: Some((index + 1) as u8),
            });
        }

        Ok(orders)
    }

    async fn place_stop(
        &self,
        pair: &str,
        position_type: PositionType,
        stop_price: Decimal,
        quantity: Decimal,
    ) -> Result<crate::venue::OrderAck, EngineError> {
        let exit_side = position_type.exit_side();
        let mut request = OrderRequest::stop_market(pair, exit_side, stop_price);
        match self.venue.change_position_tpsl_mode(pair, true).await {
            Ok(()) => {}
            Err(_) => {
                request.close_position = false;
                request.quantity = Some(quantity);
                request.reduce_only = true;
            }
        }
        Ok(self.venue.place_order(&request).await?)
    }
}

fn quantize_tick(price: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size <= Decimal::ZERO {
        return price;
    }
    ((price / tick_size).floor() * tick_size).normalize()
}
