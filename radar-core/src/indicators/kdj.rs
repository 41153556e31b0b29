//! KDJ stochastic oscillator.
//!
//! RSV = (close - lowest low) / (highest high - lowest low) * 100 over `window` bars.
//! K = ((m-1)·K₋₁ + RSV) / m, D = ((n-1)·D₋₁ + K) / n, both seeded at 50.
//! J = 3K - 2D.
//! Lookback: window - 1. A flat window (high == low) gives RSV = 50.

use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct KdjOutput {
    pub k: Vec<Option<f64>>,
    pub d: Vec<Option<f64>>,
    pub j: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct Kdj {
    window: usize,
    k_smoothing: usize,
    d_smoothing: usize,
}

impl Kdj {
    pub fn new(window: usize, k_smoothing: usize, d_smoothing: usize) -> Self {
        assert!(
            window >= 1 && k_smoothing >= 1 && d_smoothing >= 1,
            "KDJ periods must be >= 1"
        );
        Self {
            window,
            k_smoothing,
            d_smoothing,
        }
    }

    pub fn lookback(&self) -> usize {
        self.window - 1
    }

    pub fn compute_all(&self, bars: &[Bar]) -> KdjOutput {
        let n = bars.len();
        let mut out = KdjOutput {
            k: vec![None; n],
            d: vec![None; n],
            j: vec![None; n],
        };
        if n < self.window {
            return out;
        }

        let m = self.k_smoothing as f64;
        let nd = self.d_smoothing as f64;
        let mut k_prev = 50.0;
        let mut d_prev = 50.0;

        for i in self.window - 1..n {
            let span = &bars[i + 1 - self.window..=i];
            let hh = span.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let ll = span.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            let rsv = if hh > ll {
                (bars[i].close - ll) / (hh - ll) * 100.0
            } else {
                50.0
            };

            let k = ((m - 1.0) * k_prev + rsv) / m;
            let d = ((nd - 1.0) * d_prev + k) / nd;
            out.k[i] = Some(k);
            out.d[i] = Some(d);
            out.j[i] = Some(3.0 * k - 2.0 * d);
            k_prev = k;
            d_prev = d;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn first_value_at_window_end() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 13.0]);
        let out = Kdj::new(3, 3, 3).compute_all(&bars);
        assert!(out.k[1].is_none());
        assert!(out.k[2].is_some());
    }

    #[test]
    fn known_first_values() {
        // Window 3 over bars 0..=2: highs 11,12,13, lows 9,9,10 → hh=13, ll=9
        // RSV = (12-9)/(13-9)*100 = 75
        // K = (2*50 + 75)/3 = 58.333.., D = (2*50 + K)/3 = 52.777..
        let bars = make_bars(&[10.0, 11.0, 12.0]);
        let out = Kdj::new(3, 3, 3).compute_all(&bars);
        let k = 175.0 / 3.0;
        let d = (100.0 + k) / 3.0;
        assert_approx(out.k[2].unwrap(), k, DEFAULT_EPSILON);
        assert_approx(out.d[2].unwrap(), d, DEFAULT_EPSILON);
        assert_approx(out.j[2].unwrap(), 3.0 * k - 2.0 * d, DEFAULT_EPSILON);
    }

    #[test]
    fn falling_series_drives_k_low() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64 * 2.0).collect();
        let out = Kdj::new(9, 3, 3).compute_all(&make_bars(&closes));
        assert!(out.k[29].unwrap() < 20.0);
        assert!(out.d[29].unwrap() < 30.0);
    }
}
