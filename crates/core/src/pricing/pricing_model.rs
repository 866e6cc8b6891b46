//! Price tick contract shared by feed adapters and the engines.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::Symbol;

/// One observed price for one symbol.
///
/// Feeds deliver ticks at-least-once; `(symbol, observed_at)` identifies an
/// observation, and the cache drops anything at or older than the latest
/// applied observation for the symbol.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PriceTick {
    pub symbol: Symbol,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl PriceTick {
    pub fn new(symbol: impl Into<Symbol>, price: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            observed_at,
        }
    }
}
