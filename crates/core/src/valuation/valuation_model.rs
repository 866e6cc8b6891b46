//! Valuation output types and engine configuration.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::{PortfolioId, Symbol};

/// Valuation engine settings.
#[derive(Clone, Debug)]
pub struct ValuationConfig {
    /// A held symbol whose latest tick is older than this window (relative to
    /// the valuation's `as_of`) is priced with the carried-forward value and
    /// flagged stale.
    pub staleness_window: Duration,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            // One feed day: daily closes arriving on schedule never go stale.
            staleness_window: Duration::hours(24),
        }
    }
}

/// Valuation of a single held symbol.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionValuation {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub average_cost: Decimal,
    /// Latest applied price, carried forward however old it is. `None` when
    /// the symbol has never ticked.
    pub market_price: Option<Decimal>,
    pub price_as_of: Option<DateTime<Utc>>,
    /// `quantity x market_price`; falls back to cost basis before the first
    /// tick.
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub is_stale: bool,
}

/// Full valuation of one portfolio at a point in time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioValuation {
    pub aggregate_id: PortfolioId,
    pub as_of: DateTime<Utc>,
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    /// Lifetime realized P&L over consumed lots.
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    /// Lifetime cash dividends received.
    pub dividend_income: Decimal,
    pub positions: Vec<PositionValuation>,
    /// Held symbols currently priced by a stale or missing tick.
    pub stale_symbols: Vec<Symbol>,
    pub is_stale: bool,
}

impl PortfolioValuation {
    /// Market-value weight per symbol. Empty when the portfolio has no
    /// market value.
    pub fn position_weights(&self) -> Vec<(Symbol, Decimal)> {
        if self.market_value <= Decimal::ZERO {
            return Vec::new();
        }
        self.positions
            .iter()
            .filter(|p| p.market_value > Decimal::ZERO)
            .map(|p| (p.symbol.clone(), p.market_value / self.market_value))
            .collect()
    }
}
