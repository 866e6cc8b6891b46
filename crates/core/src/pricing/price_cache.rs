//! Latest-price cache with exactly-once tick application.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;

use super::PriceTick;
use crate::events::Symbol;

/// Latest applied observation per symbol.
///
/// `apply` enforces the exactly-once rule for an at-least-once feed: a tick
/// at or older than the applied observation for its symbol is dropped. The
/// entry lock makes the compare-and-replace atomic per symbol.
#[derive(Default)]
pub struct PriceCache {
    latest: DashMap<Symbol, PriceTick>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a tick. Returns `false` when the tick is a duplicate or out of
    /// date and nothing changed.
    pub fn apply(&self, tick: PriceTick) -> bool {
        match self.latest.entry(tick.symbol.clone()) {
            Entry::Occupied(mut slot) => {
                if tick.observed_at <= slot.get().observed_at {
                    debug!(
                        "dropping tick for {} at {}: not newer than {}",
                        tick.symbol,
                        tick.observed_at,
                        slot.get().observed_at
                    );
                    return false;
                }
                slot.insert(tick);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(tick);
                true
            }
        }
    }

    pub fn latest(&self, symbol: &Symbol) -> Option<PriceTick> {
        self.latest.get(symbol).map(|t| t.clone())
    }

    /// A symbol is stale when it has no applied tick, or its latest
    /// observation is older than `window` relative to `as_of`.
    pub fn is_stale(&self, symbol: &Symbol, as_of: DateTime<Utc>, window: Duration) -> bool {
        match self.latest(symbol) {
            None => true,
            Some(tick) => as_of - tick.observed_at > window,
        }
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap()
    }

    #[test]
    fn test_newer_tick_replaces_older() {
        let cache = PriceCache::new();
        assert!(cache.apply(PriceTick::new("AAPL", dec!(100), at(0))));
        assert!(cache.apply(PriceTick::new("AAPL", dec!(101), at(1))));
        assert_eq!(cache.latest(&Symbol::new("AAPL")).unwrap().price, dec!(101));
    }

    #[test]
    fn test_redelivered_tick_is_dropped() {
        let cache = PriceCache::new();
        assert!(cache.apply(PriceTick::new("AAPL", dec!(100), at(0))));
        // Same observation redelivered, even with a different price.
        assert!(!cache.apply(PriceTick::new("AAPL", dec!(999), at(0))));
        assert_eq!(cache.latest(&Symbol::new("AAPL")).unwrap().price, dec!(100));
    }

    #[test]
    fn test_out_of_date_tick_is_dropped() {
        let cache = PriceCache::new();
        assert!(cache.apply(PriceTick::new("AAPL", dec!(102), at(5))));
        assert!(!cache.apply(PriceTick::new("AAPL", dec!(95), at(2))));
        assert_eq!(cache.latest(&Symbol::new("AAPL")).unwrap().price, dec!(102));
    }

    #[test]
    fn test_symbols_do_not_interfere() {
        let cache = PriceCache::new();
        cache.apply(PriceTick::new("AAPL", dec!(100), at(3)));
        cache.apply(PriceTick::new("MSFT", dec!(200), at(1)));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.latest(&Symbol::new("MSFT")).unwrap().price, dec!(200));
    }

    #[test]
    fn test_staleness_window() {
        let cache = PriceCache::new();
        let symbol = Symbol::new("AAPL");
        assert!(cache.is_stale(&symbol, at(0), Duration::minutes(10)));

        cache.apply(PriceTick::new("AAPL", dec!(100), at(0)));
        assert!(!cache.is_stale(&symbol, at(10), Duration::minutes(10)));
        assert!(cache.is_stale(&symbol, at(11), Duration::minutes(10)));
    }
}
