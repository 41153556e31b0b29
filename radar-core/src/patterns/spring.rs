//! Wyckoff spring: a shakeout below range support that closes back inside
//! the range on light volume.

use super::{volume_ratio, Detection, Detector};
use crate::batch::InstrumentView;
use crate::domain::DetectorKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringParams {
    /// Bars before the last one that define support.
    pub support_window: usize,
    /// Volume on the shakeout bar must stay below this multiple of average.
    pub max_volume_multiple: f64,
    pub warmup_bars: usize,
}

impl Default for SpringParams {
    fn default() -> Self {
        Self {
            support_window: 20,
            max_volume_multiple: 1.0,
            warmup_bars: 21,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Spring {
    params: SpringParams,
}

impl Spring {
    pub fn new(params: SpringParams) -> Self {
        Self { params }
    }
}

impl Detector for Spring {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Spring
    }

    fn warmup_bars(&self) -> usize {
        self.params.warmup_bars
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        let p = &self.params;
        let last = view.last()?;
        if p.support_window == 0 || last < p.support_window {
            return None;
        }

        let support = view.low[last - p.support_window..last]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let (low, close) = (view.low[last], view.close[last]);
        if !(low < support && close > support) {
            return None;
        }
        let vol_ratio = volume_ratio(view, last)?;
        if vol_ratio >= p.max_volume_multiple {
            return None;
        }

        let recovery = ((close - support) / (support - low)).clamp(0.0, 1.0);
        let quietness = (1.0 - vol_ratio / p.max_volume_multiple).clamp(0.0, 1.0);
        let score = 0.6 + 0.2 * recovery + 0.2 * quietness;

        let mut detection = Detection::bullish(last, score.clamp(0.0, 1.0))
            .with_metric("penetration", (support - low) / support)
            .with_metric("volume_ratio", vol_ratio);
        detection.level = Some(support);
        Some(detection)
    }
}
