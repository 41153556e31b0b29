//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (alpha = 1/period), seeded with the mean of
//! TR[1..=period]. Lookback: period.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// TR[0] = high - low (no previous close).
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, b)| {
            if i == 0 {
                b.high - b.low
            } else {
                let pc = bars[i - 1].close;
                (b.high - b.low)
                    .max((b.high - pc).abs())
                    .max((b.low - pc).abs())
            }
        })
        .collect()
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let n = bars.len();
        let mut result = vec![None; n];
        if n < self.period + 1 {
            return result;
        }

        let tr = true_range(bars);
        let p = self.period as f64;
        let mut atr = tr[1..=self.period].iter().sum::<f64>() / p;
        result[self.period] = Some(atr);
        for i in self.period + 1..n {
            atr = (atr * (p - 1.0) + tr[i]) / p;
            result[i] = Some(atr);
        }
        result
    }
}
