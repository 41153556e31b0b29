//! Symmetric triangle breakout.
//!
//! Swing highs over the lookback window must trend down and swing lows must
//! trend up, so the two fitted lines converge. A signal fires on the bar
//! that first closes outside either line, confirmed by volume. Upside breaks
//! are bullish, downside breaks bearish.

use super::pivots::{fit_line, swing_points, PivotKind};
use super::{volume_ratio, Detection, Detector};
use crate::batch::InstrumentView;
use crate::domain::{DetectorKind, Direction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangleParams {
    /// Bars before the breakout bar that form the triangle.
    pub window: usize,
    pub swing_radius: usize,
    pub min_touches: usize,
    pub volume_multiple: f64,
    pub warmup_bars: usize,
}

impl Default for TriangleParams {
    fn default() -> Self {
        Self {
            window: 40,
            swing_radius: 2,
            min_touches: 2,
            volume_multiple: 1.5,
            warmup_bars: 45,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Triangle {
    params: TriangleParams,
}

impl Triangle {
    pub fn new(params: TriangleParams) -> Self {
        Self { params }
    }
}

impl Detector for Triangle {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Triangle
    }

    fn warmup_bars(&self) -> usize {
        self.params.warmup_bars
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        let p = &self.params;
        let last = view.last()?;
        if last < p.window {
            return None;
        }

        let swings = swing_points(view.high, view.low, last - p.window..last, p.swing_radius);
        let (peaks, troughs): (Vec<_>, Vec<_>) =
            swings.into_iter().partition(|s| s.kind == PivotKind::Peak);
        if peaks.len() < p.min_touches || troughs.len() < p.min_touches {
            return None;
        }

        let (upper_slope, upper_icpt) = fit_line(&peaks)?;
        let (lower_slope, lower_icpt) = fit_line(&troughs)?;
        if !(upper_slope < 0.0 && lower_slope > 0.0) {
            return None;
        }

        let upper = |i: usize| upper_slope * i as f64 + upper_icpt;
        let lower = |i: usize| lower_slope * i as f64 + lower_icpt;
        if upper(last) <= lower(last) {
            return None;
        }

        let (close, prev) = (view.close[last], view.close[last - 1]);
        let direction = if close > upper(last) && prev <= upper(last - 1) {
            Direction::Bullish
        } else if close < lower(last) && prev >= lower(last - 1) {
            Direction::Bearish
        } else {
            return None;
        };

        let vol_ratio = volume_ratio(view, last)?;
        if vol_ratio < p.volume_multiple {
            return None;
        }

        let touches = peaks.len() + troughs.len();
        let score = 0.6
            + 0.05 * touches.saturating_sub(2 * p.min_touches).min(4) as f64
            + 0.1 * (vol_ratio / p.volume_multiple - 1.0).min(1.0);

        let level = match direction {
            Direction::Bullish => upper(last),
            Direction::Bearish => lower(last),
        };
        let mut pivots: Vec<usize> = peaks.iter().chain(&troughs).map(|s| s.index).collect();
        pivots.sort_unstable();

        let mut detection = Detection::bullish(last, score.clamp(0.0, 1.0))
            .with_metric("upper_slope", upper_slope)
            .with_metric("lower_slope", lower_slope)
            .with_metric("touches", touches as f64)
            .with_metric("volume_ratio", vol_ratio);
        detection.direction = direction;
        detection.level = Some(level);
        detection.pivots = pivots;
        Some(detection)
    }
}
