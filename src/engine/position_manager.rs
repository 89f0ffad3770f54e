//! Conflict resolution across live trades on one symbol: merge same-side
//! additions, replace opposite-side positions, or reject.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fees::weighted_entry_price;
use crate::models::{PositionType, Trade};

/// Which conflict actions configuration permits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionPolicy {
    pub allow_merge: bool,
    pub allow_replace: bool,
    /// Cap on simultaneously open trades per symbol, used as the merge
    /// tie-break.
    pub max_position_trades: usize,
}

impl Default for PositionPolicy {
    fn default() -> Self {
        Self {
            allow_merge: true,
            allow_replace: true,
            max_position_trades: 3,
        }
    }
}

/// Decision for a new trade arriving while other trades exist on the symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictDecision {
    Proceed,
    /// Fold the new fill into the given open trade.
    Merge { primary_id: i64 },
    /// Close the given opposite-side trade at market first, then open.
    Replace { existing_id: i64 },
    Reject { reason: String },
}

pub struct PositionManager {
    policy: PositionPolicy,
}

impl PositionManager {
    pub fn new(policy: PositionPolicy) -> Self {
        Self { policy }
    }

    /// Resolve a conflict for a new position of `new_type` given the trades
    /// currently holding live quantity on the same symbol.
    pub fn resolve(&self, new_type: PositionType, open_trades: &[Trade]) -> ConflictDecision {
        let live: Vec<&Trade> = open_trades
            .iter()
            .filter(|t| t.status().has_position() && t.merged_into_trade_id.is_none())
            .collect();

        let Some(first) = live.first() else {
            return ConflictDecision::Proceed;
        };

        let same_side = first.position_type() == Some(new_type);
        if same_side {
            // Both MERGE and REJECT are permitted; merge only while below
            // the per-symbol trade cap.
            if self.policy.allow_merge && live.len() < self.policy.max_position_trades {
                return ConflictDecision::Merge {
                    primary_id: first.id,
                };
            }
            return ConflictDecision::Reject {
                reason: format!(
                    "same-side position already open ({} live trades)",
                    live.len()
                ),
            };
        }

        if self.policy.allow_replace {
            return ConflictDecision::Replace {
                existing_id: first.id,
            };
        }
        ConflictDecision::Reject {
            reason: "opposite-side position already open".into(),
        }
    }
}

/// Weighted-average entry and combined size for a merge.
pub fn merged_position(
    primary_entry: Decimal,
    primary_size: Decimal,
    added_entry: Decimal,
    added_size: Decimal,
) -> Option<(Decimal, Decimal)> {
    let entry = weighted_entry_price(&[(primary_entry, primary_size), (added_entry, added_size)])?;
    Some((entry, primary_size + added_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn open_trade(id: i64, position_type: &str) -> Trade {
        Trade {
            id,
            discord_id: format!("d{id}"),
            timestamp: Utc::now(),
            coin_symbol: Some("HYPE".into()),
            parsed_signal: None,
            signal_type: Some("initial".into()),
            status: "OPEN".into(),
            position_type: Some(position_type.into()),
            order_type: Some("LIMIT".into()),
            entry_price: Some(dec("32")),
            binance_entry_price: Some(dec("32")),
            exit_price: None,
            position_size: Some(dec("3")),
            exchange_order_id: Some(format!("o{id}")),
            original_order_response: None,
            binance_response: None,
            order_status_response: None,
            tp_sl_orders: json!([]),
            pnl_usd: None,
            sync_error_count: 0,
            sync_issues: json!([]),
            manual_verification_needed: false,
            created_at: Some(Utc::now()),
            closed_at: None,
            updated_at: Utc::now(),
            merged_into_trade_id: None,
            merge_reason: None,
            merged_at: None,
        }
    }

    fn manager() -> PositionManager {
        PositionManager::new(PositionPolicy::default())
    }

    #[test]
    fn no_conflict_proceeds() {
        assert_eq!(
            manager().resolve(PositionType::Long, &[]),
            ConflictDecision::Proceed
        );
    }

    #[test]
    fn same_side_below_cap_merges() {
        let open = vec![open_trade(1, "LONG")];
        assert_eq!(
            manager().resolve(PositionType::Long, &open),
            ConflictDecision::Merge { primary_id: 1 }
        );
    }

    #[test]
    fn same_side_at_cap_rejects() {
        let open = vec![
            open_trade(1, "LONG"),
            open_trade(2, "LONG"),
            open_trade(3, "LONG"),
        ];
        assert!(matches!(
            manager().resolve(PositionType::Long, &open),
            ConflictDecision::Reject { .. }
        ));
    }

    #[test]
    fn opposite_side_replaces() {
        let open = vec![open_trade(1, "SHORT")];
        assert_eq!(
            manager().resolve(PositionType::Long, &open),
            ConflictDecision::Replace { existing_id: 1 }
        );
    }

    #[test]
    fn replace_disabled_rejects() {
        let pm = PositionManager::new(PositionPolicy {
            allow_replace: false,
            ..PositionPolicy::default()
        });
        let open = vec![open_trade(1, "SHORT")];
        assert!(matches!(
            pm.resolve(PositionType::Long, &open),
            ConflictDecision::Reject { .. }
        ));
    }

    #[test]
    fn merged_secondary_rows_are_ignored() {
        let mut secondary = open_trade(2, "LONG");
        secondary.merged_into_trade_id = Some(1);
        assert_eq!(
            manager().resolve(PositionType::Long, &[secondary]),
            ConflictDecision::Proceed
        );
    }

    #[test]
    fn merge_math_is_weighted() {
        let (entry, size) = merged_position(dec("32"), dec("1"), dec("31"), dec("3")).unwrap();
        assert_eq!(size, dec("4"));
        assert_eq!(entry, dec("31.25000000"));
    }
}
