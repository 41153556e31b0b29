//! Multi-indicator resonance.
//!
//! Several independent bullish indicator events landing within a short lag
//! of each other, near the last bar:
//! - MACD golden cross: histogram turns from <= 0 to > 0
//! - KDJ low-level cross: K crosses above D while D is below a floor
//! - KDJ bottom divergence: a lower price low with a higher K
//! - oversold: K, D and RSI all below their oversold levels
//!
//! Each event kind counts once. The signal anchors on the latest event.

use super::pivots::{swing_points, PivotKind};
use super::{Detection, Detector};
use crate::batch::InstrumentView;
use crate::domain::DetectorKind;
use crate::indicators::Field;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonanceParams {
    /// Events must fall within this many bars of the last bar.
    pub max_lag: usize,
    pub min_events: usize,
    pub divergence_lookback: usize,
    pub divergence_radius: usize,
    /// D must be below this for a KDJ cross to count as low-level.
    pub kdj_cross_ceiling: f64,
    pub kdj_oversold: f64,
    pub rsi_oversold: f64,
    pub warmup_bars: usize,
}

impl Default for ResonanceParams {
    fn default() -> Self {
        Self {
            max_lag: 5,
            min_events: 2,
            divergence_lookback: 30,
            divergence_radius: 2,
            kdj_cross_ceiling: 30.0,
            kdj_oversold: 20.0,
            rsi_oversold: 30.0,
            warmup_bars: 35,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    MacdGoldenCross,
    KdjLowCross,
    KdjDivergence,
    Oversold,
}

impl Event {
    fn metric(self) -> &'static str {
        match self {
            Event::MacdGoldenCross => "macd_golden_cross",
            Event::KdjLowCross => "kdj_low_cross",
            Event::KdjDivergence => "kdj_divergence",
            Event::Oversold => "oversold",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resonance {
    params: ResonanceParams,
}

impl Resonance {
    pub fn new(params: ResonanceParams) -> Self {
        Self { params }
    }

    fn macd_cross(&self, view: &InstrumentView<'_>, i: usize) -> bool {
        let hist = view.indicator(Field::MacdHistogram);
        match (i.checked_sub(1).and_then(|p| hist[p]), hist[i]) {
            (Some(prev), Some(cur)) => prev <= 0.0 && cur > 0.0,
            _ => false,
        }
    }

    fn kdj_low_cross(&self, view: &InstrumentView<'_>, i: usize) -> bool {
        let Some(p) = i.checked_sub(1) else {
            return false;
        };
        let k = view.indicator(Field::KdjK);
        let d = view.indicator(Field::KdjD);
        match (k[p], d[p], k[i], d[i]) {
            (Some(kp), Some(dp), Some(kc), Some(dc)) => {
                kp <= dp && kc > dc && dc < self.params.kdj_cross_ceiling
            }
            _ => false,
        }
    }

    fn oversold(&self, view: &InstrumentView<'_>, i: usize) -> bool {
        let p = &self.params;
        match (
            view.value(Field::KdjK, i),
            view.value(Field::KdjD, i),
            view.value(Field::Rsi, i),
        ) {
            (Some(k), Some(d), Some(rsi)) => {
                k < p.kdj_oversold && d < p.kdj_oversold && rsi < p.rsi_oversold
            }
            _ => false,
        }
    }

    /// Bar of the later swing low when the two most recent swing lows show
    /// a lower low in price but a higher K.
    fn divergence(&self, view: &InstrumentView<'_>, last: usize) -> Option<usize> {
        let p = &self.params;
        let start = (last + 1).saturating_sub(p.divergence_lookback);
        let lows: Vec<_> = swing_points(view.high, view.low, start..last + 1, p.divergence_radius)
            .into_iter()
            .filter(|s| s.kind == PivotKind::Trough)
            .collect();
        let [.., earlier, later] = lows.as_slice() else {
            return None;
        };
        let k_earlier = view.value(Field::KdjK, earlier.index)?;
        let k_later = view.value(Field::KdjK, later.index)?;
        (later.price < earlier.price && k_later > k_earlier).then_some(later.index)
    }
}

impl Detector for Resonance {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Resonance
    }

    fn warmup_bars(&self) -> usize {
        self.params.warmup_bars
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        let p = &self.params;
        let last = view.last()?;
        let from = last.saturating_sub(p.max_lag);

        // Most recent bar for each event kind within the lag window
        let mut found: Vec<(Event, usize)> = Vec::new();
        let mut note = |event: Event, bar: usize| {
            if !found.iter().any(|(e, _)| *e == event) {
                found.push((event, bar));
            }
        };
        for i in (from..=last).rev() {
            if self.macd_cross(view, i) {
                note(Event::MacdGoldenCross, i);
            }
            if self.kdj_low_cross(view, i) {
                note(Event::KdjLowCross, i);
            }
            if self.oversold(view, i) {
                note(Event::Oversold, i);
            }
        }
        if let Some(bar) = self.divergence(view, last).filter(|&b| b >= from) {
            note(Event::KdjDivergence, bar);
        }

        if found.len() < p.min_events {
            return None;
        }

        let anchor = found.iter().map(|(_, bar)| *bar).max()?;
        let score = (0.35 + 0.2 * found.len() as f64).min(1.0);
        let mut detection =
            Detection::bullish(anchor, score).with_metric("events", found.len() as f64);
        for (event, bar) in &found {
            detection = detection.with_metric(event.metric(), (last - bar) as f64);
        }
        let mut pivots: Vec<usize> = found.iter().map(|(_, bar)| *bar).collect();
        pivots.sort_unstable();
        pivots.dedup();
        detection.pivots = pivots;
        Some(detection)
    }
}
