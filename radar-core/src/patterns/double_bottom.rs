//! Double bottom (W) with a neckline breakout.

use super::pivots::{zigzag, PivotKind};
use super::{volume_ratio, Detection, Detector};
use crate::batch::InstrumentView;
use crate::domain::DetectorKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoubleBottomParams {
    /// Largest fractional difference between the two lows.
    pub low_tolerance: f64,
    /// Fewest bars between the two lows.
    pub min_separation: usize,
    /// Neckline must sit at least this fraction above the higher low.
    pub min_neckline_rise: f64,
    /// Breakout must be fresh: some close within this many bars before the
    /// last one was still at or below the neckline.
    pub fresh_window: usize,
    pub pivot_threshold: f64,
    /// Breakout volume multiple that earns the volume bonus.
    pub volume_multiple: f64,
    pub warmup_bars: usize,
}

impl Default for DoubleBottomParams {
    fn default() -> Self {
        Self {
            low_tolerance: 0.03,
            min_separation: 5,
            min_neckline_rise: 0.05,
            fresh_window: 3,
            pivot_threshold: 0.03,
            volume_multiple: 1.5,
            warmup_bars: 40,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DoubleBottom {
    params: DoubleBottomParams,
}

impl DoubleBottom {
    pub fn new(params: DoubleBottomParams) -> Self {
        Self { params }
    }
}

impl Detector for DoubleBottom {
    fn kind(&self) -> DetectorKind {
        DetectorKind::DoubleBottom
    }

    fn warmup_bars(&self) -> usize {
        self.params.warmup_bars
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        let p = &self.params;
        let last = view.last()?;
        if last < p.fresh_window {
            return None;
        }

        let pivots = zigzag(view.high, view.low, p.pivot_threshold);
        if pivots.last()?.kind != PivotKind::Trough {
            return None;
        }
        let mut troughs = pivots.iter().rev().filter(|pv| pv.kind == PivotKind::Trough);
        let second = *troughs.next()?;
        let first = *troughs.next()?;

        if second.index - first.index < p.min_separation {
            return None;
        }
        let low_diff = (second.price - first.price).abs() / first.price;
        if low_diff > p.low_tolerance {
            return None;
        }

        let neckline = view.high[first.index..=second.index]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if neckline < first.price.max(second.price) * (1.0 + p.min_neckline_rise) {
            return None;
        }

        if view.close[last] <= neckline {
            return None;
        }
        let fresh = view.close[last - p.fresh_window..last]
            .iter()
            .any(|&c| c <= neckline);
        if !fresh {
            return None;
        }

        let vol_ratio = volume_ratio(view, last).unwrap_or(0.0);
        let mut score = 0.6 + 0.15 * (1.0 - low_diff / p.low_tolerance);
        if vol_ratio >= p.volume_multiple {
            score += 0.15;
        }

        let mut detection = Detection::bullish(last, score.clamp(0.0, 1.0))
            .with_metric("low_diff", low_diff)
            .with_metric("neckline_rise", neckline / first.price.max(second.price) - 1.0)
            .with_metric("separation", (second.index - first.index) as f64)
            .with_metric("volume_ratio", vol_ratio);
        detection.level = Some(neckline);
        detection.pivots = vec![first.index, second.index];
        Some(detection)
    }
}
