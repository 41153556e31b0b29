//! Bar: one session's price/volume record.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single instrument and session.
///
/// Volume is in shares. Turnover is in the quote currency and optional,
/// since not every source reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    #[serde(default)]
    pub turnover: Option<f64>,
}

impl Bar {
    /// The trading session this bar belongs to.
    pub fn session(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// Returns true if any price field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// `low <= min(open, close) <= max(open, close) <= high`, positive prices,
    /// and a non-negative finite turnover when present.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        let turnover_ok = self.turnover.map_or(true, |t| t.is_finite() && t >= 0.0);
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && turnover_ok
    }

    /// High-low range as a fraction of the low.
    pub fn amplitude(&self) -> f64 {
        if self.low > 0.0 {
            (self.high - self.low) / self.low
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000,
            turnover: Some(5_150_000.0),
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn negative_turnover_is_insane() {
        let mut bar = sample_bar();
        bar.turnover = Some(-1.0);
        assert!(!bar.is_sane());
    }

    #[test]
    fn amplitude_relative_to_low() {
        let bar = sample_bar();
        assert!((bar.amplitude() - 7.0 / 98.0).abs() < 1e-12);
    }

    #[test]
    fn missing_turnover_deserializes_as_none() {
        let json = r#"{"timestamp":"2024-01-02T00:00:00","open":1.0,"high":1.0,"low":1.0,"close":1.0,"volume":0}"#;
        let bar: Bar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.turnover, None);
    }
}
