//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1]
//! Seed: EMA[period-1] = SMA of first `period` close values.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
        ema_of_series(&closes, self.period)
    }
}

/// EMA over a series that may start with absent values.
///
/// The seed window begins at the first present value, so an EMA of MACD
/// (absent for the slow warm-up) lines up after both warm-ups. An absent
/// value after the seed makes the rest of the output absent.
pub fn ema_of_series(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];

    let Some(start) = values.iter().position(Option::is_some) else {
        return result;
    };
    if period == 0 || n < start + period {
        return result;
    }

    let mut sum = 0.0;
    for v in &values[start..start + period] {
        match v {
            Some(v) => sum += v,
            None => return result,
        }
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed_index = start + period - 1;
    let mut prev = sum / period as f64;
    result[seed_index] = Some(prev);

    for i in seed_index + 1..n {
        let Some(v) = values[i] else {
            return result;
        };
        prev = alpha * v + (1.0 - alpha) * prev;
        result[i] = Some(prev);
    }

    result
}
