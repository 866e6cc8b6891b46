//! Risk engine: rolling return series per portfolio, metrics on demand.

use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use rust_decimal::Decimal;

use super::{ReturnsWindow, RiskConfig, RiskSnapshot};
use crate::errors::{DatabaseError, Error, Result};
use crate::events::PortfolioId;
use crate::pricing::PriceTick;
use crate::valuation::{PortfolioValuation, ValuationObserver};

/// Daily close series folded into returns incrementally.
///
/// Multiple values on the same date revise that day's close (and the day's
/// return); a later date seals the previous close and starts the next return.
#[derive(Clone, Debug)]
struct DailySeries {
    window: ReturnsWindow,
    prev_close: Option<Decimal>,
    current: Option<(NaiveDate, Decimal)>,
}

impl DailySeries {
    fn new(capacity: usize) -> Self {
        Self {
            window: ReturnsWindow::new(capacity),
            prev_close: None,
            current: None,
        }
    }

    fn observe(&mut self, date: NaiveDate, value: Decimal) {
        match self.current {
            None => self.current = Some((date, value)),
            Some((current_date, _)) if date == current_date => {
                self.current = Some((date, value));
                self.push_current_return();
            }
            Some((current_date, close)) if date > current_date => {
                self.prev_close = Some(close);
                self.current = Some((date, value));
                self.push_current_return();
            }
            Some((current_date, _)) => {
                debug!("ignoring out-of-order daily value for {date} (at {current_date})");
            }
        }
    }

    fn push_current_return(&mut self) {
        let (Some(prev), Some((date, value))) = (self.prev_close, self.current) else {
            return;
        };
        if prev.is_zero() {
            return;
        }
        self.window.push(date, value / prev - Decimal::ONE);
    }
}

/// State per tracked portfolio.
struct AggregateRiskState {
    series: DailySeries,
    concentration: Decimal,
    stale: bool,
    as_of: DateTime<Utc>,
}

/// Maintains rolling risk inputs and computes metrics on demand.
///
/// Subscribes to the valuation engine for portfolio values (one close per
/// calendar day) and to the tick path for benchmark closes.
pub struct RiskEngine {
    config: RiskConfig,
    states: DashMap<PortfolioId, AggregateRiskState>,
    benchmark: RwLock<DailySeries>,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        let window = config.window;
        Self {
            config,
            states: DashMap::new(),
            benchmark: RwLock::new(DailySeries::new(window)),
        }
    }

    /// Feeds a benchmark close when the tick is for the configured benchmark
    /// symbol; all other ticks are ignored.
    pub fn handle_tick(&self, tick: &PriceTick) {
        let Some(benchmark) = &self.config.benchmark else {
            return;
        };
        if &tick.symbol != benchmark {
            return;
        }
        let Ok(mut series) = self.benchmark.write() else {
            warn!("benchmark series unavailable, dropping {} tick", tick.symbol);
            return;
        };
        series.observe(tick.observed_at.date_naive(), tick.price);
    }

    /// Current metrics for one portfolio.
    pub fn risk_snapshot(&self, aggregate_id: &PortfolioId) -> Result<RiskSnapshot> {
        let state = self.states.get(aggregate_id).ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "no risk state for {aggregate_id}"
            )))
        })?;

        let window = &state.series.window;
        let observations = window.len();
        let enough = observations >= self.config.min_observations;

        let volatility = if enough {
            window.volatility()
        } else {
            Decimal::ZERO
        };
        let sharpe_ratio = if volatility.is_zero() {
            Decimal::ZERO
        } else {
            (window.mean() - self.config.risk_free_rate) / volatility
        };
        let value_at_risk = if enough {
            window.value_at_risk(self.config.confidence)
        } else {
            Decimal::ZERO
        };
        let beta = match (&self.config.benchmark, self.benchmark.read()) {
            (Some(_), Ok(benchmark)) => window.beta_against(&benchmark.window),
            _ => None,
        };

        Ok(RiskSnapshot {
            aggregate_id: aggregate_id.clone(),
            as_of: state.as_of,
            volatility,
            beta,
            sharpe_ratio,
            value_at_risk,
            concentration_score: state.concentration,
            observations,
            is_stale: state.stale,
        })
    }
}

impl ValuationObserver for RiskEngine {
    fn on_valuation(&self, valuation: &PortfolioValuation) {
        let mut state = self
            .states
            .entry(valuation.aggregate_id.clone())
            .or_insert_with(|| AggregateRiskState {
                series: DailySeries::new(self.config.window),
                concentration: Decimal::ZERO,
                stale: false,
                as_of: valuation.as_of,
            });

        state
            .series
            .observe(valuation.as_of.date_naive(), valuation.market_value);
        state.concentration = valuation
            .position_weights()
            .iter()
            .map(|(_, weight)| *weight * *weight)
            .sum();
        state.stale = valuation.is_stale;
        state.as_of = valuation.as_of;
    }
}
