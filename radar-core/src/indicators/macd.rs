//! MACD: moving average convergence/divergence.
//!
//! line = EMA(fast) - EMA(slow), present from index slow-1
//! signal = EMA(signal) of line, present from index slow+signal-2
//! histogram = line - signal

use super::ema::ema_of_series;
use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdOutput {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(
            fast >= 1 && slow > fast && signal >= 1,
            "MACD requires 1 <= fast < slow and signal >= 1"
        );
        Self { fast, slow, signal }
    }

    /// Lookback of the line; the signal line needs `signal - 1` more bars.
    pub fn lookback(&self) -> usize {
        self.slow - 1
    }

    pub fn signal_lookback(&self) -> usize {
        self.slow + self.signal - 2
    }

    pub fn compute_all(&self, bars: &[Bar]) -> MacdOutput {
        let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);

        let line: Vec<Option<f64>> = fast
            .iter()
            .zip(&slow)
            .map(|(f, s)| Some((*f)? - (*s)?))
            .collect();
        let signal = ema_of_series(&line, self.signal);
        let histogram = line
            .iter()
            .zip(&signal)
            .map(|(l, s)| Some((*l)? - (*s)?))
            .collect();

        MacdOutput {
            line,
            signal,
            histogram,
        }
    }
}
