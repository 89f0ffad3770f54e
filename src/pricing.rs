//! Reference pricing with a short-lived read-mostly cache over the venue's
//! mark price. Single-writer refresh: concurrent readers of a stale entry
//! race to refresh, last write wins, both see a usable price.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

use crate::venue::{FuturesVenue, VenueResult};

const PRICE_TTL: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct PriceService {
    venue: Arc<dyn FuturesVenue>,
    cache: Arc<RwLock<HashMap<String, (Decimal, Instant)>>>,
}

impl PriceService {
    pub fn new(venue: Arc<dyn FuturesVenue>) -> Self {
        Self {
            venue,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Current reference price for a trading pair, served from cache when
    /// fresh.
    pub async fn reference_price(&self, symbol: &str) -> VenueResult<Decimal> {
        if let Some(price) = self.cached(symbol) {
            return Ok(price);
        }
        let price = self.venue.mark_price(symbol).await?;
        self.store(symbol, price);
        Ok(price)
    }

    fn cached(&self, symbol: &str) -> Option<Decimal> {
        let guard = self.cache.read().expect("price cache poisoned");
        let (price, stored_at) = guard.get(symbol)?;
        (stored_at.elapsed() <= PRICE_TTL).then_some(*price)
    }

    fn store(&self, symbol: &str, price: Decimal) {
        let mut guard = self.cache.write().expect("price cache poisoned");
        guard.insert(symbol.to_string(), (price, Instant::now()));
    }
}

/// Relative distance between a signal price and the market, as a percentage
/// of the market price.
pub fn price_deviation_pct(signal_price: Decimal, market_price: Decimal) -> Option<Decimal> {
    if market_price <= Decimal::ZERO {
        return None;
    }
    let diff = (signal_price - market_price).abs();
    Some(diff / market_price * Decimal::ONE_HUNDRED)
}
