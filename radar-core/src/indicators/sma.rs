//! Simple moving averages of close and of volume.
//!
//! Rolling mean over a fixed window. Lookback: period - 1.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        rolling_mean(&closes, self.period)
    }
}

/// Moving average of share volume.
#[derive(Debug, Clone)]
pub struct VolumeSma {
    period: usize,
    name: String,
}

impl VolumeSma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "volume SMA period must be >= 1");
        Self {
            period,
            name: format!("volume_sma_{period}"),
        }
    }
}

impl Indicator for VolumeSma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>> {
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
        rolling_mean(&volumes, self.period)
    }
}

/// Rolling mean with a running sum. First value at index `period - 1`.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut result = vec![None; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = values[..period].iter().sum();
    result[period - 1] = Some(sum / period as f64);
    for i in period..n {
        sum += values[i] - values[i - period];
        result[i] = Some(sum / period as f64);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn sma_known_values() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let result = Sma::new(3).compute(&bars);
        assert_eq!(result[1], None);
        assert_approx(result[2].unwrap(), 2.0, DEFAULT_EPSILON);
        assert_approx(result[4].unwrap(), 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn volume_sma_averages_volume() {
        let mut bars = make_bars(&[1.0, 2.0, 3.0]);
        bars[2].volume = 4000;
        let result = VolumeSma::new(3).compute(&bars);
        assert_approx(result[2].unwrap(), 2000.0, DEFAULT_EPSILON);
    }

    #[test]
    fn short_input_is_all_absent() {
        assert!(rolling_mean(&[1.0, 2.0], 3).iter().all(Option::is_none));
    }
}
