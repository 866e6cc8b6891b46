//! Risk metric types and engine configuration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RISK_WINDOW;
use crate::events::{PortfolioId, Symbol};

/// Risk engine settings.
#[derive(Clone, Debug)]
pub struct RiskConfig {
    /// Rolling window length in daily observations.
    pub window: usize,
    /// Daily risk-free rate used by the Sharpe ratio.
    pub risk_free_rate: Decimal,
    /// VaR confidence level.
    pub confidence: Decimal,
    /// Symbol whose ticks feed the benchmark return series for beta.
    pub benchmark: Option<Symbol>,
    /// Below this many observations, window metrics report zero.
    pub min_observations: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_RISK_WINDOW,
            risk_free_rate: Decimal::ZERO,
            confidence: dec!(0.95),
            benchmark: None,
            min_observations: 2,
        }
    }
}

/// Point-in-time risk metrics for one portfolio. Derived data: any snapshot
/// is reproducible from the events and ticks that preceded it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiskSnapshot {
    pub aggregate_id: PortfolioId,
    pub as_of: DateTime<Utc>,
    /// Sample standard deviation of windowed daily returns.
    pub volatility: Decimal,
    /// Covariance beta against the configured benchmark; `None` without
    /// enough date-paired benchmark overlap.
    pub beta: Option<Decimal>,
    pub sharpe_ratio: Decimal,
    /// Historical-simulation VaR as a positive loss magnitude.
    pub value_at_risk: Decimal,
    /// Herfindahl index over current position weights.
    pub concentration_score: Decimal,
    /// Daily returns currently in the window.
    pub observations: usize,
    /// True when the underlying valuation was priced by stale ticks.
    pub is_stale: bool,
}
