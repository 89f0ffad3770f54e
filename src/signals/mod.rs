//! Signal routing: classify inbound records as initial signals or follow-up
//! alerts and drive them through the trade coordinator. Initial signals bind
//! to a pre-created trade row by millisecond timestamp; follow-ups bind to
//! their parent trade by discord_id.

pub mod actions;
pub mod parser;

use std::sync::Arc;

use metrics::counter;
use serde_json::json;
use sqlx::PgPool;

use crate::db::{alert_repo, trade_repo};
use crate::engine::mailbox::SymbolMailboxes;
use crate::engine::{EngineError, TradeCoordinator};
use crate::models::{AlertStatus, SignalEvent, TradeStatus};

use actions::{classify_alert, AlertAction};
use parser::parse_signal;

pub struct SignalRouter {
    pool: PgPool,
    coordinator: Arc<TradeCoordinator>,
    mailboxes: Arc<SymbolMailboxes>,
}

impl SignalRouter {
    pub fn new(
        pool: PgPool,
        coordinator: Arc<TradeCoordinator>,
        mailboxes: Arc<SymbolMailboxes>,
    ) -> Self {
        Self {
            pool,
            coordinator,
            mailboxes,
        }
    }

    /// Entry point for the ingress queue consumer.
    pub async fn route(&self, event: SignalEvent) -> anyhow::Result<()> {
        if event.is_followup() {
            self.handle_followup(event).await
        } else {
            self.handle_initial(event).await
        }
    }

    async fn handle_initial(&self, event: SignalEvent) -> anyhow::Result<()> {
        counter!("signals_received").increment(1);

        // Bind by [t, t+1ms). Re-delivery finds the same row, which makes
        // ingestion idempotent.
        let trade = match trade_repo::find_by_timestamp_range(&self.pool, event.timestamp).await? {
            Some(trade) => trade,
            None => {
                let discord_id = event
                    .discord_id
                    .clone()
                    .unwrap_or_else(|| format!("ts-{}", event.timestamp.timestamp_millis()));
                trade_repo::insert_signal_trade(&self.pool, &discord_id, event.timestamp).await?
            }
        };

        let parsed = match parse_signal(&event.content, event.structured.as_deref()) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(trade_id = trade.id, error = %err, "Unparseable signal");
                trade_repo::mark_failed(
                    &self.pool,
                    trade.id,
                    TradeStatus::Failed,
                    &format!("signal parse failed: {err}"),
                )
                .await?;
                return Ok(());
            }
        };

        trade_repo::set_parsed_signal(
            &self.pool,
            trade.id,
            &serde_json::to_value(&parsed)?,
            &parsed.coin_symbol,
            &parsed.position_type.to_string(),
            parsed.order_type.as_str(),
            parsed.limit_entry_price(),
        )
        .await?;

        // Exactly one placement attempt per row, no matter how many times
        // the signal is delivered.
        if !trade_repo::claim_for_processing(&self.pool, trade.id).await? {
            tracing::info!(
                trade_id = trade.id,
                discord_id = %trade.discord_id,
                "Signal already claimed — skipping duplicate delivery"
            );
            return Ok(());
        }

        let coordinator = Arc::clone(&self.coordinator);
        let trade_id = trade.id;
        let outcome = self
            .mailboxes
            .run(&parsed.coin_symbol, move || async move {
                coordinator.open_position(trade_id).await
            })
            .await;

        match outcome {
            Ok(Ok(result)) => {
                counter!("trades_opened").increment(1);
                tracing::info!(
                    trade_id,
                    order_id = %result.order_id,
                    qty = %result.quantity,
                    fees = %result.expected_fees,
                    breakeven = %result.breakeven_price,
                    merged_into = ?result.merged_into,
                    "Trade placed"
                );
            }
            Ok(Err(EngineError::Rejected { reason, .. })) => {
                tracing::warn!(trade_id, %reason, "Trade rejected");
            }
            Ok(Err(err)) => {
                tracing::error!(trade_id, error = %err, "Trade placement failed");
            }
            Err(err) => {
                tracing::error!(trade_id, error = %err, "Symbol mailbox unavailable");
            }
        }
        Ok(())
    }

    async fn handle_followup(&self, event: SignalEvent) -> anyhow::Result<()> {
        counter!("alerts_received").increment(1);
        let parent_ref = event.parent_ref.clone().unwrap_or_default();

        let alert = alert_repo::insert_alert(
            &self.pool,
            event.timestamp,
            event.discord_id.as_deref(),
            &parent_ref,
            &event.content,
            event.trader.as_deref(),
        )
        .await?;

        let Some(parent) = trade_repo::find_by_discord_id(&self.pool, &parent_ref).await? else {
            alert_repo::record_outcome(
                &self.pool,
                alert.id,
                AlertStatus::Failed,
                &json!({ "error": format!("parent trade {parent_ref} not found") }),
            )
            .await?;
            return Ok(());
        };

        let action = classify_alert(&event.content);
        alert_repo::set_parsed_alert(&self.pool, alert.id, &serde_json::to_value(&action)?)
            .await?;

        if parent.status().skips_followups() {
            alert_repo::record_outcome(
                &self.pool,
                alert.id,
                AlertStatus::Skipped,
                &json!({ "skipped": "no open position", "parent_status": parent.status }),
            )
            .await?;
            return Ok(());
        }

        if matches!(action, AlertAction::Unknown) {
            alert_repo::record_outcome(
                &self.pool,
                alert.id,
                AlertStatus::Failed,
                &json!({ "error": "no action recognized in alert content" }),
            )
            .await?;
            return Ok(());
        }

        let Some(coin_symbol) = parent.coin_symbol.clone() else {
            alert_repo::record_outcome(
                &self.pool,
                alert.id,
                AlertStatus::Failed,
                &json!({ "error": "parent trade has no coin symbol" }),
            )
            .await?;
            return Ok(());
        };

        let coordinator = Arc::clone(&self.coordinator);
        let parent_id = parent.id;
        let dispatch_action = action.clone();
        let outcome = self
            .mailboxes
            .run(&coin_symbol, move || async move {
                coordinator.apply_alert(parent_id, &dispatch_action).await
            })
            .await;

        match outcome {
            Ok(Ok(response)) => {
                counter!("alerts_applied").increment(1);
                alert_repo::record_outcome(&self.pool, alert.id, AlertStatus::Applied, &response)
                    .await?;
            }
            Ok(Err(err)) => {
                tracing::warn!(alert_id = alert.id, error = %err, "Alert application failed");
                alert_repo::record_outcome(
                    &self.pool,
                    alert.id,
                    AlertStatus::Failed,
                    &json!({ "error": err.to_string() }),
                )
                .await?;
            }
            Err(err) => {
                alert_repo::record_outcome(
                    &self.pool,
                    alert.id,
                    AlertStatus::Failed,
                    &json!({ "error": format!("symbol mailbox unavailable: {err}") }),
                )
                .await?;
            }
        }
        Ok(())
    }
}

/// Normalize an ISO-8601 timestamp string: strip the trailing `Z` so that
/// equal instants compare equal regardless of the upstream formatter.
pub fn normalize_timestamp(raw: &str) -> &str {
    raw.strip_suffix('Z').unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_z_is_stripped() {
        assert_eq!(
            normalize_timestamp("2025-01-05T10:15:30.123Z"),
            "2025-01-05T10:15:30.123"
        );
        assert_eq!(
            normalize_timestamp("2025-01-05T10:15:30.123"),
            "2025-01-05T10:15:30.123"
        );
    }
}
