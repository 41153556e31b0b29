//! Columnar universe batch.
//!
//! The scanner does not walk instruments one object at a time. Every
//! instrument's bars and indicator columns are concatenated into one
//! contiguous array per field, with an offset table marking where each
//! instrument starts. Detectors receive an `InstrumentView`: borrowed slices
//! into those arrays for exactly one instrument.

use crate::domain::InstrumentId;
use crate::hybrid::UnifiedSeries;
use crate::indicators::{Field, IndicatorFrame};
use chrono::NaiveDateTime;
use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    #[error("{instrument}: series has {series} bars but indicator frame has {frame}")]
    LengthMismatch {
        instrument: InstrumentId,
        series: usize,
        frame: usize,
    },
}

#[derive(Debug, Default)]
pub struct UniverseBatch {
    instruments: Vec<InstrumentId>,
    open_last: Vec<bool>,
    offsets: Vec<usize>,
    timestamps: Vec<NaiveDateTime>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    indicators: Vec<Vec<Option<f64>>>,
}

impl UniverseBatch {
    pub fn with_capacity(instruments: usize, bars: usize) -> Self {
        let mut offsets = Vec::with_capacity(instruments + 1);
        offsets.push(0);
        Self {
            instruments: Vec::with_capacity(instruments),
            open_last: Vec::with_capacity(instruments),
            offsets,
            timestamps: Vec::with_capacity(bars),
            open: Vec::with_capacity(bars),
            high: Vec::with_capacity(bars),
            low: Vec::with_capacity(bars),
            close: Vec::with_capacity(bars),
            volume: Vec::with_capacity(bars),
            indicators: (0..Field::COUNT)
                .map(|_| Vec::with_capacity(bars))
                .collect(),
        }
    }

    /// Append one instrument's columns.
    pub fn push(&mut self, series: &UnifiedSeries, frame: &IndicatorFrame) -> Result<(), BatchError> {
        if series.len() != frame.len() {
            return Err(BatchError::LengthMismatch {
                instrument: series.instrument().clone(),
                series: series.len(),
                frame: frame.len(),
            });
        }
        if self.offsets.is_empty() {
            self.offsets.push(0);
        }
        if self.indicators.is_empty() {
            self.indicators = vec![Vec::new(); Field::COUNT];
        }

        for bar in series.bars() {
            self.timestamps.push(bar.timestamp);
            self.open.push(bar.open);
            self.high.push(bar.high);
            self.low.push(bar.low);
            self.close.push(bar.close);
            self.volume.push(bar.volume as f64);
        }
        for field in Field::ALL {
            self.indicators[field.index()].extend_from_slice(frame.column(field));
        }

        self.instruments.push(series.instrument().clone());
        self.open_last.push(series.has_open_bar());
        self.offsets.push(self.timestamps.len());
        Ok(())
    }

    /// Number of instruments.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn total_bars(&self) -> usize {
        self.timestamps.len()
    }

    fn range(&self, index: usize) -> Range<usize> {
        self.offsets[index]..self.offsets[index + 1]
    }

    /// Borrowed columns for the instrument at `index`.
    pub fn view(&self, index: usize) -> InstrumentView<'_> {
        let r = self.range(index);
        InstrumentView {
            instrument: &self.instruments[index],
            open_last: self.open_last[index],
            timestamps: &self.timestamps[r.clone()],
            open: &self.open[r.clone()],
            high: &self.high[r.clone()],
            low: &self.low[r.clone()],
            close: &self.close[r.clone()],
            volume: &self.volume[r.clone()],
            indicators: std::array::from_fn(|f| &self.indicators[f][r.clone()]),
        }
    }
}

/// One instrument's slice of a `UniverseBatch`.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentView<'a> {
    pub instrument: &'a InstrumentId,
    /// The last bar is an incomplete live bar.
    pub open_last: bool,
    pub timestamps: &'a [NaiveDateTime],
    pub open: &'a [f64],
    pub high: &'a [f64],
    pub low: &'a [f64],
    pub close: &'a [f64],
    pub volume: &'a [f64],
    indicators: [&'a [Option<f64>]; Field::COUNT],
}

impl<'a> InstrumentView<'a> {
    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Index of the most recent bar.
    pub fn last(&self) -> Option<usize> {
        self.len().checked_sub(1)
    }

    pub fn indicator(&self, field: Field) -> &'a [Option<f64>] {
        self.indicators[field.index()]
    }

    pub fn value(&self, field: Field, index: usize) -> Option<f64> {
        self.indicators[field.index()].get(index).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Series;
    use crate::indicators::{make_bars, IndicatorParams};

    fn unified(symbol: &str, closes: &[f64]) -> (UnifiedSeries, IndicatorFrame) {
        let bars = make_bars(closes);
        let frame = IndicatorFrame::compute(&bars, &IndicatorParams::default()).unwrap();
        let series = Series::new(InstrumentId::new("SH", symbol), bars).unwrap();
        (UnifiedSeries::from_history(series), frame)
    }

    #[test]
    fn views_slice_each_instrument() {
        let a: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let b: Vec<f64> = (0..12).map(|i| 50.0 - i as f64).collect();
        let (sa, fa) = unified("600000", &a);
        let (sb, fb) = unified("600001", &b);

        let mut batch = UniverseBatch::with_capacity(2, 42);
        batch.push(&sa, &fa).unwrap();
        batch.push(&sb, &fb).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.total_bars(), 42);

        let va = batch.view(0);
        assert_eq!(va.len(), 30);
        assert_eq!(va.close[0], 10.0);
        assert_eq!(va.indicator(Field::Rsi), fa.column(Field::Rsi));

        let vb = batch.view(1);
        assert_eq!(vb.instrument.symbol, "600001");
        assert_eq!(vb.len(), 12);
        assert_eq!(vb.close[11], 39.0);
        assert_eq!(vb.last(), Some(11));
        assert_eq!(vb.value(Field::KdjK, 8), fb.value(Field::KdjK, 8));
    }

    #[test]
    fn push_rejects_length_mismatch() {
        let (sa, _) = unified("600000", &[10.0; 30]);
        let (_, short_frame) = unified("600000", &[10.0; 12]);
        let mut batch = UniverseBatch::default();
        let err = batch.push(&sa, &short_frame).unwrap_err();
        assert!(matches!(err, BatchError::LengthMismatch { series: 30, frame: 12, .. }));
        assert!(batch.is_empty());
    }
}
