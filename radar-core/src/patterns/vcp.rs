//! Volatility contraction pattern (VCP).
//!
//! A sequence of pullbacks whose depth shrinks each time, with lows holding
//! up, followed by a breakout above the most recent pullback high on
//! expanding volume. Pullbacks are taken from zigzag pivots; the pattern is
//! evaluated at the last bar only, so a signal always means the breakout is
//! happening now.

use super::pivots::{zigzag, Pivot, PivotKind};
use super::{volume_ratio, Detection, Detector};
use crate::batch::InstrumentView;
use crate::domain::DetectorKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VcpParams {
    /// Each pullback may be at most this fraction of the one before it.
    pub contraction_factor: f64,
    pub min_contractions: usize,
    /// Breakout volume relative to the trailing volume average.
    pub volume_multiple: f64,
    /// Zigzag reversal threshold for pivot confirmation.
    pub pivot_threshold: f64,
    /// Allowed fractional slip of a later pullback low below an earlier one.
    pub low_tolerance: f64,
    pub warmup_bars: usize,
}

impl Default for VcpParams {
    fn default() -> Self {
        Self {
            contraction_factor: 0.8,
            min_contractions: 2,
            volume_multiple: 2.0,
            pivot_threshold: 0.03,
            low_tolerance: 0.03,
            warmup_bars: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vcp {
    params: VcpParams,
}

/// One pullback: a peak and the trough that follows it.
#[derive(Debug, Clone, Copy)]
struct Pullback {
    peak: Pivot,
    trough: Pivot,
}

impl Pullback {
    fn depth(&self) -> f64 {
        (self.peak.price - self.trough.price) / self.peak.price
    }
}

impl Vcp {
    pub fn new(params: VcpParams) -> Self {
        Self { params }
    }

    /// Contracting pullbacks ending at the most recent confirmed trough,
    /// oldest first.
    fn contractions(&self, pivots: &[Pivot]) -> Vec<Pullback> {
        let pullbacks: Vec<Pullback> = pivots
            .windows(2)
            .filter(|w| w[0].kind == PivotKind::Peak && w[1].kind == PivotKind::Trough)
            .map(|w| Pullback {
                peak: w[0],
                trough: w[1],
            })
            .collect();

        let Some(last) = pullbacks.last().copied() else {
            return Vec::new();
        };
        let mut chain = vec![last];
        for earlier in pullbacks.iter().rev().skip(1) {
            let later = chain[chain.len() - 1];
            let contracting = later.depth() <= earlier.depth() * self.params.contraction_factor;
            let lows_hold =
                later.trough.price >= earlier.trough.price * (1.0 - self.params.low_tolerance);
            if !(contracting && lows_hold) {
                break;
            }
            chain.push(*earlier);
        }
        chain.reverse();
        chain
    }
}

impl Detector for Vcp {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Vcp
    }

    fn warmup_bars(&self) -> usize {
        self.params.warmup_bars
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        let last = view.last()?;
        if last < 1 {
            return None;
        }

        let pivots = zigzag(view.high, view.low, self.params.pivot_threshold);
        if pivots.last()?.kind != PivotKind::Trough {
            return None;
        }
        let chain = self.contractions(&pivots);
        if chain.len() < self.params.min_contractions {
            return None;
        }

        let final_pullback = chain[chain.len() - 1];
        let pivot_high = final_pullback.peak.price;
        if !(view.close[last] > pivot_high && view.close[last - 1] <= pivot_high) {
            return None;
        }

        let vol_ratio = volume_ratio(view, last)?;
        if vol_ratio < self.params.volume_multiple {
            return None;
        }

        let count = chain.len();
        let final_depth = final_pullback.depth();
        let mut score = 0.6;
        score += 0.1 * (count - self.params.min_contractions).min(2) as f64;
        score += 0.1 * (vol_ratio / self.params.volume_multiple - 1.0).min(1.0);
        if final_depth < 0.08 {
            score += 0.1;
        }

        let mut detection = Detection::bullish(last, score.clamp(0.0, 1.0))
            .with_metric("contractions", count as f64)
            .with_metric("final_depth", final_depth)
            .with_metric("first_depth", chain[0].depth())
            .with_metric("volume_ratio", vol_ratio);
        detection.level = Some(pivot_high);
        detection.pivots = chain
            .iter()
            .flat_map(|p| [p.peak.index, p.trough.index])
            .collect();
        Some(detection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::fixtures::{bars_from_closes, batch, ramp};

    /// Base run-up, pullbacks of roughly 20%, 12% and 6%, then a push back
    /// under the last pullback high.
    fn vcp_closes() -> Vec<f64> {
        let mut path = vec![80.0];
        ramp(&mut path, 100.0, 40);
        ramp(&mut path, 80.0, 10);
        ramp(&mut path, 98.0, 10);
        ramp(&mut path, 86.24, 8);
        ramp(&mut path, 97.0, 8);
        ramp(&mut path, 91.18, 6);
        ramp(&mut path, 96.0, 4);
        path
    }

    #[test]
    fn breakout_on_volume_matches() {
        let mut closes = vcp_closes();
        closes.push(99.0);
        let mut bars = bars_from_closes(&closes, 1000);
        bars.last_mut().unwrap().volume = 2500;
        let batch = batch(bars);

        let detection = Vcp::new(VcpParams::default())
            .detect(&batch.view(0))
            .expect("vcp should match");
        assert_eq!(detection.anchor, closes.len() - 1);
        assert_eq!(detection.metrics["contractions"], 3.0);
        assert!((detection.score - 0.825).abs() < 1e-9, "{}", detection.score);
        assert_eq!(detection.pivots.len(), 6);
        let level = detection.level.unwrap();
        assert!((level - 97.0 * 1.005).abs() < 1e-9);
    }

    #[test]
    fn breakout_without_volume_is_rejected() {
        let mut closes = vcp_closes();
        closes.push(99.0);
        let batch = batch(bars_from_closes(&closes, 1000));
        assert!(Vcp::new(VcpParams::default()).detect(&batch.view(0)).is_none());
    }

    #[test]
    fn no_breakout_no_signal() {
        let batch = batch(bars_from_closes(&vcp_closes(), 1000));
        assert!(Vcp::new(VcpParams::default()).detect(&batch.view(0)).is_none());
    }

    #[test]
    fn expanding_pullbacks_do_not_qualify() {
        let mut path = vec![80.0];
        ramp(&mut path, 100.0, 40);
        ramp(&mut path, 94.0, 6);
        ramp(&mut path, 99.0, 6);
        ramp(&mut path, 80.0, 10);
        ramp(&mut path, 96.0, 8);
        path.push(101.0);
        let mut bars = bars_from_closes(&path, 1000);
        bars.last_mut().unwrap().volume = 3000;
        let batch = batch(bars);
        assert!(Vcp::new(VcpParams::default()).detect(&batch.view(0)).is_none());
    }
}
