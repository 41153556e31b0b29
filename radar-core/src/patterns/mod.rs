//! Pattern detectors: structural chart patterns and indicator resonance.
//!
//! Detectors are instrument-local: they receive one `InstrumentView` and
//! evaluate the pattern as of its most recent bar. A detector returns a
//! scored `Detection` or `None`; it never sees other instruments and holds
//! no state between calls, so the scanner can run them in parallel.

pub mod double_bottom;
pub mod pivots;
pub mod resonance;
pub mod spring;
pub mod triangle;
pub mod vcp;

pub use double_bottom::{DoubleBottom, DoubleBottomParams};
pub use resonance::{Resonance, ResonanceParams};
pub use spring::{Spring, SpringParams};
pub use triangle::{Triangle, TriangleParams};
pub use vcp::{Vcp, VcpParams};

use crate::batch::InstrumentView;
use crate::domain::{DetectorKind, Direction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A detector match, in bar indices of the view it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Bar the signal is anchored on (the breakout / event bar).
    pub anchor: usize,
    /// Raw score; the scanner clamps it to `[0, 1]`.
    pub score: f64,
    pub direction: Direction,
    pub level: Option<f64>,
    /// Pattern-defining pivot bars, oldest first.
    pub pivots: Vec<usize>,
    pub metrics: BTreeMap<String, f64>,
}

impl Detection {
    pub fn bullish(anchor: usize, score: f64) -> Self {
        Self {
            anchor,
            score,
            direction: Direction::Bullish,
            level: None,
            pivots: Vec::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }
}

/// Trait for pattern detectors.
///
/// `detect` evaluates the pattern as of the view's last bar and must only
/// read bars `0..=last`.
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Bars needed before the detector can produce output.
    fn warmup_bars(&self) -> usize;

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection>;
}

/// Parameters for every detector kind, with documented defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    pub vcp: VcpParams,
    pub double_bottom: DoubleBottomParams,
    pub triangle: TriangleParams,
    pub resonance: ResonanceParams,
    pub spring: SpringParams,
}

/// Build the runtime detector for a kind.
pub fn create_detector(kind: DetectorKind, params: &DetectorParams) -> Box<dyn Detector> {
    match kind {
        DetectorKind::Vcp => Box::new(Vcp::new(params.vcp.clone())),
        DetectorKind::DoubleBottom => Box::new(DoubleBottom::new(params.double_bottom.clone())),
        DetectorKind::Triangle => Box::new(Triangle::new(params.triangle.clone())),
        DetectorKind::Resonance => Box::new(Resonance::new(params.resonance.clone())),
        DetectorKind::Spring => Box::new(Spring::new(params.spring.clone())),
    }
}

/// Volume of `index` relative to the trailing average as of the bar before it.
pub(crate) fn volume_ratio(view: &InstrumentView<'_>, index: usize) -> Option<f64> {
    use crate::indicators::Field;
    let prior = index.checked_sub(1)?;
    let avg = view.value(Field::VolumeMa, prior)?;
    if avg > 0.0 {
        Some(view.volume[index] / avg)
    } else {
        None
    }
}

/// Test fixtures: build a single-instrument batch from explicit bars.
#[cfg(test)]
pub(crate) mod fixtures {
    use crate::batch::UniverseBatch;
    use crate::domain::{Bar, InstrumentId, Series};
    use crate::hybrid::UnifiedSeries;
    use crate::indicators::{IndicatorFrame, IndicatorParams};
    use chrono::{Duration, NaiveDate};

    /// One bar per calendar day starting 2024-01-01.
    pub fn bar(i: usize, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Bar {
        Bar {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume,
            turnover: None,
        }
    }

    /// Bars following a close path, with a ±0.5% high/low band.
    pub fn bars_from_closes(closes: &[f64], volume: u64) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let open = if i == 0 { c } else { closes[i - 1] };
                bar(
                    i,
                    open,
                    open.max(c) * 1.005,
                    open.min(c) * 0.995,
                    c,
                    volume,
                )
            })
            .collect()
    }

    /// Linear path from `from` to `to` over `steps` bars, excluding `from`.
    pub fn ramp(path: &mut Vec<f64>, to: f64, steps: usize) {
        let from = *path.last().expect("ramp needs a starting point");
        for s in 1..=steps {
            path.push(from + (to - from) * s as f64 / steps as f64);
        }
    }

    pub fn batch(bars: Vec<Bar>) -> UniverseBatch {
        let frame = IndicatorFrame::compute(&bars, &IndicatorParams::default()).unwrap();
        let series = Series::new(InstrumentId::new("SH", "600000"), bars).unwrap();
        let unified = UnifiedSeries::from_history(series);
        let mut batch = UniverseBatch::with_capacity(1, unified.len());
        batch.push(&unified, &frame).unwrap();
        batch
    }
}
