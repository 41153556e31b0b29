//! Series: validated, strictly ordered bars for one instrument.

use super::bar::Bar;
use super::instrument::InstrumentId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SeriesError {
    #[error("bar {index} at {timestamp} violates OHLC invariants")]
    InsaneBar {
        index: usize,
        timestamp: NaiveDateTime,
    },

    #[error("bar {index} at {timestamp} is not after the previous bar at {previous}")]
    NotIncreasing {
        index: usize,
        timestamp: NaiveDateTime,
        previous: NaiveDateTime,
    },
}

/// Ordered bars for one instrument.
///
/// Construction validates every bar and requires strictly increasing
/// timestamps, so a `Series` in hand never needs re-checking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    instrument: InstrumentId,
    bars: Vec<Bar>,
}

impl Series {
    pub fn new(instrument: InstrumentId, bars: Vec<Bar>) -> Result<Self, SeriesError> {
        for (index, bar) in bars.iter().enumerate() {
            if !bar.is_sane() {
                return Err(SeriesError::InsaneBar {
                    index,
                    timestamp: bar.timestamp,
                });
            }
            if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
                return Err(SeriesError::NotIncreasing {
                    index,
                    timestamp: bar.timestamp,
                    previous: bars[index - 1].timestamp,
                });
            }
        }
        Ok(Self { instrument, bars })
    }

    pub fn empty(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            bars: Vec::new(),
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    /// Keep only the most recent `n` bars.
    pub fn tail(mut self, n: usize) -> Self {
        if self.bars.len() > n {
            self.bars.drain(..self.bars.len() - n);
        }
        self
    }

    /// Bars with `from <= timestamp <= to`; either bound may be open.
    pub fn range(&self, from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Self {
        let bars = self
            .bars
            .iter()
            .filter(|b| from.map_or(true, |f| b.timestamp >= f))
            .filter(|b| to.map_or(true, |t| b.timestamp <= t))
            .cloned()
            .collect();
        Self {
            instrument: self.instrument.clone(),
            bars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
            turnover: None,
        }
    }

    fn id() -> InstrumentId {
        InstrumentId::new("SH", "600000")
    }

    #[test]
    fn accepts_increasing_bars() {
        let s = Series::new(id(), vec![bar(2, 10.0), bar(3, 11.0)]).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.last().unwrap().close, 11.0);
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        let err = Series::new(id(), vec![bar(2, 10.0), bar(2, 11.0)]).unwrap_err();
        assert!(matches!(err, SeriesError::NotIncreasing { index: 1, .. }));
    }

    #[test]
    fn rejects_insane_bar() {
        let mut bad = bar(3, 11.0);
        bad.low = 20.0;
        let err = Series::new(id(), vec![bar(2, 10.0), bad]).unwrap_err();
        assert!(matches!(err, SeriesError::InsaneBar { index: 1, .. }));
    }

    #[test]
    fn tail_keeps_most_recent() {
        let s = Series::new(id(), vec![bar(2, 10.0), bar(3, 11.0), bar(4, 12.0)]).unwrap();
        let t = s.tail(2);
        assert_eq!(t.len(), 2);
        assert_eq!(t.bars()[0].close, 11.0);
    }

    #[test]
    fn range_is_inclusive() {
        let s = Series::new(id(), vec![bar(2, 10.0), bar(3, 11.0), bar(4, 12.0)]).unwrap();
        let r = s.range(Some(bar(3, 0.0).timestamp), Some(bar(4, 0.0).timestamp));
        assert_eq!(r.len(), 2);
        assert!(s.range(Some(bar(10, 0.0).timestamp), None).is_empty());
    }
}
