//! Indicator Library.
//!
//! Indicators are pure functions: bars in, one value per bar out. Values
//! before an indicator's warm-up window are `None` ("not yet available"),
//! never zero. Smoothing constants:
//! - EMA: alpha = 2 / (period + 1), seeded with the SMA of the first `period` values
//! - MACD: EMA(12) - EMA(26); signal EMA(9) of MACD; histogram = MACD - signal
//! - KDJ: RSV over 9 bars; K = 2/3·K₋₁ + 1/3·RSV, D = 2/3·D₋₁ + 1/3·K, seeds 50; J = 3K - 2D
//! - RSI and ATR: Wilder smoothing (alpha = 1 / period)
//! - Volatility: population stddev of log returns; Bollinger bandwidth = 2·k·stddev / SMA
//!
//! `IndicatorFrame` computes the full set once per series and stores it
//! column-wise, aligned 1:1 with the bars.

pub mod atr;
pub mod ema;
pub mod kdj;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod volatility;

pub use atr::Atr;
pub use ema::Ema;
pub use kdj::{Kdj, KdjOutput};
pub use macd::{Macd, MacdOutput};
pub use rsi::Rsi;
pub use sma::{Sma, VolumeSma};
pub use volatility::{Bandwidth, Volatility};

use crate::domain::Bar;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Single-output indicator.
///
/// `compute` returns exactly one value per bar; the first `lookback()`
/// values are `None`. No value at bar t may depend on bars after t.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_26", "atr_14").
    fn name(&self) -> &str;

    /// Number of leading bars without a value.
    fn lookback(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Vec<Option<f64>>;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("insufficient data: need at least {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("invalid indicator parameter {name}: {value}")]
    InvalidParam { name: &'static str, value: f64 },
}

/// Indicator parameters with the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub kdj_window: usize,
    pub kdj_k_smoothing: usize,
    pub kdj_d_smoothing: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub volume_ma_period: usize,
    pub volatility_window: usize,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            kdj_window: 9,
            kdj_k_smoothing: 3,
            kdj_d_smoothing: 3,
            rsi_period: 6,
            atr_period: 14,
            volume_ma_period: 20,
            volatility_window: 20,
            bollinger_period: 20,
            bollinger_k: 2.0,
        }
    }
}

impl IndicatorParams {
    pub fn validate(&self) -> Result<(), IndicatorError> {
        let periods = [
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("kdj_window", self.kdj_window),
            ("kdj_k_smoothing", self.kdj_k_smoothing),
            ("kdj_d_smoothing", self.kdj_d_smoothing),
            ("rsi_period", self.rsi_period),
            ("atr_period", self.atr_period),
            ("volume_ma_period", self.volume_ma_period),
            ("volatility_window", self.volatility_window),
            ("bollinger_period", self.bollinger_period),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(IndicatorError::InvalidParam { name, value: 0.0 });
            }
        }
        if self.macd_fast >= self.macd_slow {
            return Err(IndicatorError::InvalidParam {
                name: "macd_fast",
                value: self.macd_fast as f64,
            });
        }
        if !(self.bollinger_k.is_finite() && self.bollinger_k > 0.0) {
            return Err(IndicatorError::InvalidParam {
                name: "bollinger_k",
                value: self.bollinger_k,
            });
        }
        Ok(())
    }

    /// Bars needed before the shortest-window indicator yields a value.
    pub fn min_bars(&self) -> usize {
        let lookbacks = [
            self.macd_fast.saturating_sub(1),
            self.kdj_window.saturating_sub(1),
            self.rsi_period,
            self.atr_period,
            self.volume_ma_period.saturating_sub(1),
            self.volatility_window,
            self.bollinger_period.saturating_sub(1),
        ];
        lookbacks.into_iter().min().unwrap_or(0) + 1
    }
}

/// Columns held by an `IndicatorFrame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    MacdLine,
    MacdSignal,
    MacdHistogram,
    KdjK,
    KdjD,
    KdjJ,
    Rsi,
    Atr,
    VolumeMa,
    Volatility,
    Bandwidth,
}

impl Field {
    pub const COUNT: usize = 11;

    pub const ALL: [Field; Field::COUNT] = [
        Field::MacdLine,
        Field::MacdSignal,
        Field::MacdHistogram,
        Field::KdjK,
        Field::KdjD,
        Field::KdjJ,
        Field::Rsi,
        Field::Atr,
        Field::VolumeMa,
        Field::Volatility,
        Field::Bandwidth,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-bar indicator values for one series, stored column-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    len: usize,
    columns: Vec<Vec<Option<f64>>>,
}

impl IndicatorFrame {
    /// Compute every frame column over `bars`.
    ///
    /// Fails only when the series is shorter than the shortest warm-up
    /// window; otherwise longer-window columns simply start with `None`.
    pub fn compute(bars: &[Bar], params: &IndicatorParams) -> Result<Self, IndicatorError> {
        params.validate()?;
        let need = params.min_bars();
        if bars.len() < need {
            return Err(IndicatorError::InsufficientData {
                need,
                got: bars.len(),
            });
        }

        let macd = Macd::new(params.macd_fast, params.macd_slow, params.macd_signal)
            .compute_all(bars);
        let kdj = Kdj::new(
            params.kdj_window,
            params.kdj_k_smoothing,
            params.kdj_d_smoothing,
        )
        .compute_all(bars);

        let mut columns = vec![Vec::new(); Field::COUNT];
        columns[Field::MacdLine.index()] = macd.line;
        columns[Field::MacdSignal.index()] = macd.signal;
        columns[Field::MacdHistogram.index()] = macd.histogram;
        columns[Field::KdjK.index()] = kdj.k;
        columns[Field::KdjD.index()] = kdj.d;
        columns[Field::KdjJ.index()] = kdj.j;
        columns[Field::Rsi.index()] = Rsi::new(params.rsi_period).compute(bars);
        columns[Field::Atr.index()] = Atr::new(params.atr_period).compute(bars);
        columns[Field::VolumeMa.index()] = VolumeSma::new(params.volume_ma_period).compute(bars);
        columns[Field::Volatility.index()] =
            Volatility::new(params.volatility_window).compute(bars);
        columns[Field::Bandwidth.index()] =
            Bandwidth::new(params.bollinger_period, params.bollinger_k).compute(bars);

        Ok(Self {
            len: bars.len(),
            columns,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column(&self, field: Field) -> &[Option<f64>] {
        &self.columns[field.index()]
    }

    pub fn value(&self, field: Field, index: usize) -> Option<f64> {
        self.columns[field.index()].get(index).copied().flatten()
    }
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev_close (or close for the first bar), high = max(open,close) + 1,
/// low = min(open,close) - 1, volume = 1000, turnover = 50M, one bar per
/// calendar day.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                timestamp: base + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000,
                turnover: Some(50_000_000.0),
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_length_matches_series() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0).collect();
        let bars = make_bars(&closes);
        let frame = IndicatorFrame::compute(&bars, &IndicatorParams::default()).unwrap();
        assert_eq!(frame.len(), bars.len());
        for field in Field::ALL {
            assert_eq!(frame.column(field).len(), bars.len(), "{field:?}");
        }
    }

    #[test]
    fn frame_warmup_is_absent_not_zero() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let bars = make_bars(&closes);
        let frame = IndicatorFrame::compute(&bars, &IndicatorParams::default()).unwrap();
        assert!(frame.column(Field::MacdLine)[..25].iter().all(Option::is_none));
        assert!(frame.value(Field::MacdLine, 25).is_some());
        assert!(frame.column(Field::MacdSignal)[..33].iter().all(Option::is_none));
        assert!(frame.value(Field::MacdSignal, 33).is_some());
        assert!(frame.column(Field::KdjK)[..8].iter().all(Option::is_none));
        assert!(frame.value(Field::KdjK, 8).is_some());
    }

    #[test]
    fn ten_bars_leave_long_indicators_unavailable() {
        let bars = make_bars(&[10.0, 11.0, 12.0, 11.5, 12.5, 13.0, 12.0, 12.2, 12.8, 13.1]);
        let frame = IndicatorFrame::compute(&bars, &IndicatorParams::default()).unwrap();
        assert_eq!(frame.len(), 10);
        assert!(frame.column(Field::MacdLine).iter().all(Option::is_none));
        assert!(frame.column(Field::MacdSignal).iter().all(Option::is_none));
        assert!(frame.value(Field::Rsi, 9).is_some());
    }

    #[test]
    fn too_short_series_is_insufficient() {
        let bars = make_bars(&[10.0, 11.0, 12.0]);
        let err = IndicatorFrame::compute(&bars, &IndicatorParams::default()).unwrap_err();
        assert_eq!(err, IndicatorError::InsufficientData { need: 7, got: 3 });
    }

    #[test]
    fn invalid_params_rejected() {
        let params = IndicatorParams {
            macd_fast: 30,
            ..IndicatorParams::default()
        };
        assert!(params.validate().is_err());
        let params = IndicatorParams {
            rsi_period: 0,
            ..IndicatorParams::default()
        };
        assert!(params.validate().is_err());
    }
}
