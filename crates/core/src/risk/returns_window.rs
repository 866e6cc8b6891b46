//! Rolling window of daily returns with O(1) mean/variance maintenance.

use std::collections::{HashMap, VecDeque};

use chrono::NaiveDate;
use num_traits::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};

/// Bounded, date-keyed series of daily returns.
///
/// Pushing a return for the date already at the back replaces it (the window
/// holds the last value per calendar day); when full, the oldest observation
/// falls off. Running sum and sum of squares keep mean and variance O(1)
/// instead of rescanning the window.
#[derive(Clone, Debug)]
pub struct ReturnsWindow {
    capacity: usize,
    observations: VecDeque<(NaiveDate, Decimal)>,
    sum: Decimal,
    sum_sq: Decimal,
}

impl ReturnsWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            observations: VecDeque::new(),
            sum: Decimal::ZERO,
            sum_sq: Decimal::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Records the return for `date`, replacing a same-date observation at
    /// the back and evicting the oldest once the window is full.
    pub fn push(&mut self, date: NaiveDate, ret: Decimal) {
        if let Some((last_date, last_ret)) = self.observations.back_mut() {
            if *last_date == date {
                self.sum += ret - *last_ret;
                self.sum_sq += ret * ret - *last_ret * *last_ret;
                *last_ret = ret;
                return;
            }
        }

        self.observations.push_back((date, ret));
        self.sum += ret;
        self.sum_sq += ret * ret;

        while self.observations.len() > self.capacity {
            if let Some((_, evicted)) = self.observations.pop_front() {
                self.sum -= evicted;
                self.sum_sq -= evicted * evicted;
            }
        }
    }

    pub fn mean(&self) -> Decimal {
        let n = self.observations.len();
        if n == 0 {
            return Decimal::ZERO;
        }
        self.sum / Decimal::from(n)
    }

    /// Sample variance over the window; zero below two observations.
    pub fn sample_variance(&self) -> Decimal {
        let n = self.observations.len();
        if n < 2 {
            return Decimal::ZERO;
        }
        let n_dec = Decimal::from(n);
        let mean = self.mean();
        let variance = (self.sum_sq - n_dec * mean * mean) / (n_dec - Decimal::ONE);
        // Rounded mean can push a near-zero variance slightly negative.
        variance.max(Decimal::ZERO)
    }

    /// Sample standard deviation of the window returns.
    pub fn volatility(&self) -> Decimal {
        self.sample_variance().sqrt().unwrap_or(Decimal::ZERO)
    }

    /// Historical-simulation VaR at `confidence`, as a positive loss
    /// magnitude: the negated return at the (1 - confidence) empirical
    /// percentile, floored at zero.
    pub fn value_at_risk(&self, confidence: Decimal) -> Decimal {
        let n = self.observations.len();
        if n == 0 {
            return Decimal::ZERO;
        }

        let mut sorted: Vec<Decimal> = self.observations.iter().map(|(_, r)| *r).collect();
        sorted.sort();

        let index = ((Decimal::ONE - confidence) * Decimal::from(n))
            .floor()
            .to_usize()
            .unwrap_or(0)
            .min(n - 1);
        (-sorted[index]).max(Decimal::ZERO)
    }

    /// Covariance-based beta of this window against a benchmark window,
    /// over date-matched pairs. `None` below two pairs or when the benchmark
    /// shows no variance.
    pub fn beta_against(&self, benchmark: &ReturnsWindow) -> Option<Decimal> {
        let by_date: HashMap<NaiveDate, Decimal> =
            benchmark.observations.iter().copied().collect();
        let pairs: Vec<(Decimal, Decimal)> = self
            .observations
            .iter()
            .filter_map(|(date, ret)| by_date.get(date).map(|b| (*ret, *b)))
            .collect();

        let n = pairs.len();
        if n < 2 {
            return None;
        }
        let n_dec = Decimal::from(n);
        let mean_p: Decimal = pairs.iter().map(|(p, _)| *p).sum::<Decimal>() / n_dec;
        let mean_b: Decimal = pairs.iter().map(|(_, b)| *b).sum::<Decimal>() / n_dec;

        let mut covariance = Decimal::ZERO;
        let mut benchmark_variance = Decimal::ZERO;
        for (p, b) in &pairs {
            covariance += (*p - mean_p) * (*b - mean_b);
            benchmark_variance += (*b - mean_b) * (*b - mean_b);
        }

        if benchmark_variance.is_zero() {
            return None;
        }
        Some(covariance / benchmark_variance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn window_with(returns: &[Decimal]) -> ReturnsWindow {
        let mut window = ReturnsWindow::new(252);
        for (i, ret) in returns.iter().enumerate() {
            window.push(day(i as u32 + 1), *ret);
        }
        window
    }

    #[test]
    fn test_mean_and_sample_variance() {
        let window = window_with(&[
            dec!(0.01),
            dec!(-0.02),
            dec!(0.015),
            dec!(0.00),
            dec!(-0.01),
        ]);
        assert_eq!(window.mean(), dec!(-0.001));
        assert_eq!(window.sample_variance(), dec!(0.000205));
        assert_eq!(window.volatility(), dec!(0.000205).sqrt().unwrap());
    }

    #[test]
    fn test_var_at_95_picks_the_worst_of_five() {
        let window = window_with(&[
            dec!(0.01),
            dec!(-0.02),
            dec!(0.015),
            dec!(0.00),
            dec!(-0.01),
        ]);
        assert_eq!(window.value_at_risk(dec!(0.95)), dec!(0.02));
    }

    #[test]
    fn test_var_is_floored_at_zero_for_all_gain_windows() {
        let window = window_with(&[dec!(0.01), dec!(0.02), dec!(0.03)]);
        assert_eq!(window.value_at_risk(dec!(0.95)), dec!(0));
    }

    #[test]
    fn test_var_index_clamps_at_the_top() {
        let window = window_with(&[dec!(-0.05), dec!(0.01)]);
        // confidence 0 puts the index past the end; clamp to the best return.
        assert_eq!(window.value_at_risk(dec!(0)), dec!(0));
    }

    #[test]
    fn test_eviction_keeps_running_sums_exact() {
        let mut window = ReturnsWindow::new(3);
        for (i, ret) in [dec!(0.01), dec!(0.02), dec!(0.03), dec!(0.04), dec!(0.05)]
            .iter()
            .enumerate()
        {
            window.push(day(i as u32 + 1), *ret);
        }
        assert_eq!(window.len(), 3);
        // Window is now [0.03, 0.04, 0.05].
        assert_eq!(window.mean(), dec!(0.04));
        assert_eq!(window.sample_variance(), dec!(0.0001));
    }

    #[test]
    fn test_same_date_push_replaces_the_last_observation() {
        let mut window = ReturnsWindow::new(10);
        window.push(day(1), dec!(0.01));
        window.push(day(2), dec!(0.05));
        window.push(day(2), dec!(-0.01));

        assert_eq!(window.len(), 2);
        assert_eq!(window.mean(), dec!(0));
        assert_eq!(window.value_at_risk(dec!(0.95)), dec!(0.01));
    }

    #[test]
    fn test_beta_against_benchmark() {
        let mut portfolio = ReturnsWindow::new(10);
        portfolio.push(day(1), dec!(0.02));
        portfolio.push(day(2), dec!(-0.01));
        let mut benchmark = ReturnsWindow::new(10);
        benchmark.push(day(1), dec!(0.01));
        benchmark.push(day(2), dec!(-0.005));

        assert_eq!(portfolio.beta_against(&benchmark), Some(dec!(2)));
    }

    #[test]
    fn test_beta_requires_two_paired_dates() {
        let mut portfolio = ReturnsWindow::new(10);
        portfolio.push(day(1), dec!(0.02));
        portfolio.push(day(2), dec!(-0.01));
        let mut benchmark = ReturnsWindow::new(10);
        benchmark.push(day(2), dec!(0.01));
        // Only day 2 overlaps.
        assert_eq!(portfolio.beta_against(&benchmark), None);

        benchmark.push(day(3), dec!(0.02));
        // Still one overlapping date.
        assert_eq!(portfolio.beta_against(&benchmark), None);
    }

    #[test]
    fn test_flat_benchmark_has_no_beta() {
        let mut portfolio = ReturnsWindow::new(10);
        portfolio.push(day(1), dec!(0.02));
        portfolio.push(day(2), dec!(-0.01));
        let mut benchmark = ReturnsWindow::new(10);
        benchmark.push(day(1), dec!(0.01));
        benchmark.push(day(2), dec!(0.01));

        assert_eq!(portfolio.beta_against(&benchmark), None);
    }
}
