//! Rolling volatility measures.
//!
//! - `Volatility`: population stddev of log returns over `window` returns.
//!   Lookback: window.
//! - `Bandwidth`: Bollinger band width relative to the middle band,
//!   (upper - lower) / middle = 2·k·stddev(close) / SMA(close).
//!   Population stddev. Lookback: period - 1.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Volatility {
    window: usize,
    name: String,
}

impl Volatility {
    pub fn new(window: usize) -> Self {
        assert!(window >= 1, "volatility window must be >= 1");
        Self {
            window,
            name: format!("volatility_{window}"),
        }
    }
}

impl Indicator for Volatility {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let n = bars.len();
        let mut result = vec![None; n];
        if n < self.window + 1 {
            return result;
        }
        let returns: Vec<f64> = (1..n)
            .map(|i| (bars[i].close / bars[i - 1].close).ln())
            .collect();
        // returns[i-1] is the return into bar i
        for i in self.window..n {
            let span = &returns[i - self.window..i];
            result[i] = Some(population_stddev(span));
        }
        result
    }
}

#[derive(Debug, Clone)]
pub struct Bandwidth {
    period: usize,
    k: f64,
    name: String,
}

impl Bandwidth {
    pub fn new(period: usize, k: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self {
            period,
            k,
            name: format!("bandwidth_{period}_{k}"),
        }
    }
}

impl Indicator for Bandwidth {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let n = bars.len();
        let mut result = vec![None; n];
        if n < self.period {
            return result;
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        for i in self.period - 1..n {
            let span = &closes[i + 1 - self.period..=i];
            let mean = span.iter().sum::<f64>() / self.period as f64;
            if mean > 0.0 {
                result[i] = Some(2.0 * self.k * population_stddev(span) / mean);
            }
        }
        result
    }
}

fn population_stddev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn flat_prices_have_zero_volatility() {
        let bars = make_bars(&[10.0; 6]);
        let vol = Volatility::new(3).compute(&bars);
        assert_eq!(vol[2], None);
        assert_approx(vol[3].unwrap(), 0.0, DEFAULT_EPSILON);
        let bw = Bandwidth::new(3, 2.0).compute(&bars);
        assert_approx(bw[2].unwrap(), 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn bandwidth_known_value() {
        // closes 9, 10, 11: mean 10, population stddev sqrt(2/3)
        let bars = make_bars(&[9.0, 10.0, 11.0]);
        let bw = Bandwidth::new(3, 2.0).compute(&bars);
        let expected = 4.0 * (2.0f64 / 3.0).sqrt() / 10.0;
        assert_approx(bw[2].unwrap(), expected, DEFAULT_EPSILON);
    }

    #[test]
    fn alternating_returns_have_positive_volatility() {
        let bars = make_bars(&[10.0, 11.0, 10.0, 11.0, 10.0]);
        let vol = Volatility::new(4).compute(&bars);
        assert!(vol[4].unwrap() > 0.0);
    }
}
