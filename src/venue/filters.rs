//! Symbol filter cache with TTL. Quantization is floor-based: the venue
//! rejects anything that is not an exact multiple of the step/tick.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// LOT_SIZE / PRICE_FILTER / MIN_NOTIONAL values for one trading pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub step_size: Decimal,
    pub tick_size: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub min_notional: Decimal,
}

impl SymbolFilters {
    /// `floor(qty / step) × step`.
    pub fn quantize_qty(&self, qty: Decimal) -> Decimal {
        quantize_floor(qty, self.step_size)
    }

    /// `floor(price / tick) × tick`.
    pub fn quantize_price(&self, price: Decimal) -> Decimal {
        quantize_floor(price, self.tick_size)
    }

    /// Bounds check for an already-quantized quantity at a reference price.
    pub fn validate(&self, qty: Decimal, price: Decimal) -> Result<(), FilterViolation> {
        if qty < self.min_qty {
            return Err(FilterViolation::BelowMinQty { qty, min: self.min_qty });
        }
        if self.max_qty > Decimal::ZERO && qty > self.max_qty {
            return Err(FilterViolation::AboveMaxQty { qty, max: self.max_qty });
        }
        let notional = qty * price;
        if notional < self.min_notional {
            return Err(FilterViolation::BelowMinNotional {
                notional,
                min: self.min_notional,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FilterViolation {
    #[error("quantity {qty} below minQty {min}")]
    BelowMinQty { qty: Decimal, min: Decimal },

    #[error("quantity {qty} above maxQty {max}")]
    AboveMaxQty { qty: Decimal, max: Decimal },

    #[error("notional {notional} below minNotional {min}")]
    BelowMinNotional { notional: Decimal, min: Decimal },
}

fn quantize_floor(value: Decimal, unit: Decimal) -> Decimal {
    if unit <= Decimal::ZERO {
        return value;
    }
    let steps = (value / unit).floor();
    (steps * unit).normalize()
}

/// Per-symbol filter cache. Entries expire after `ttl`; refresh is lazy on
/// miss (the adapter fetches and inserts) and eager on symbol-unknown errors
/// (the adapter invalidates, then refetches).
pub struct FilterCache {
    inner: RwLock<HashMap<String, (SymbolFilters, Instant)>>,
    ttl: Duration,
}

impl FilterCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolFilters> {
        let guard = self.inner.read().expect("filter cache poisoned");
        let (filters, stored_at) = guard.get(symbol)?;
        if stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(*filters)
    }

    pub fn insert(&self, symbol: &str, filters: SymbolFilters) {
        let mut guard = self.inner.write().expect("filter cache poisoned");
        guard.insert(symbol.to_string(), (filters, Instant::now()));
    }

    pub fn invalidate(&self, symbol: &str) {
        let mut guard = self.inner.write().expect("filter cache poisoned");
        guard.remove(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn filters() -> SymbolFilters {
        SymbolFilters {
            step_size: dec("0.01"),
            tick_size: dec("0.1"),
            min_qty: dec("0.01"),
            max_qty: dec("10000"),
            min_notional: dec("5"),
        }
    }

    #[test]
    fn qty_quantizes_down() {
        // 101 / 31.8 = 3.1761…, step 0.01 → 3.17
        let f = filters();
        assert_eq!(f.quantize_qty(dec("3.1761006")), dec("3.17"));
    }

    #[test]
    fn price_quantizes_down() {
        let f = filters();
        assert_eq!(f.quantize_price(dec("32.27")), dec("32.2"));
    }

    #[test]
    fn exact_multiple_unchanged() {
        let f = filters();
        assert_eq!(f.quantize_qty(dec("3.17")), dec("3.17"));
    }

    #[test]
    fn validate_rejects_below_min_qty() {
        let f = filters();
        assert!(matches!(
            f.validate(dec("0.001"), dec("100")),
            Err(FilterViolation::BelowMinQty { .. })
        ));
    }

    #[test]
    fn validate_rejects_below_min_notional() {
        let f = filters();
        assert!(matches!(
            f.validate(dec("0.01"), dec("100")),
            Err(FilterViolation::BelowMinNotional { .. })
        ));
    }

    #[test]
    fn validate_accepts_good_order() {
        let f = filters();
        assert!(f.validate(dec("3.17"), dec("31.8")).is_ok());
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cache = FilterCache::new(Duration::from_millis(0));
        cache.insert("BTCUSDT", filters());
        // Zero TTL: any elapsed time invalidates.
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get("BTCUSDT").is_none());
    }

    #[test]
    fn cache_serves_fresh_entries() {
        let cache = FilterCache::new(Duration::from_secs(3600));
        cache.insert("BTCUSDT", filters());
        assert_eq!(cache.get("BTCUSDT"), Some(filters()));
    }
}
