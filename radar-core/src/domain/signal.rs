//! Pattern signals: scored detector matches produced fresh on every scan.

use super::instrument::InstrumentId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Detector kinds known to the scanner. Declaration order is the tie-break
/// order in scan results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Vcp,
    DoubleBottom,
    Triangle,
    Resonance,
    Spring,
}

impl DetectorKind {
    pub const ALL: [DetectorKind; 5] = [
        DetectorKind::Vcp,
        DetectorKind::DoubleBottom,
        DetectorKind::Triangle,
        DetectorKind::Resonance,
        DetectorKind::Spring,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DetectorKind::Vcp => "vcp",
            DetectorKind::DoubleBottom => "double_bottom",
            DetectorKind::Triangle => "triangle",
            DetectorKind::Resonance => "resonance",
            DetectorKind::Spring => "spring",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
}

/// Supporting evidence for a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Breakout / neckline / support level, when the pattern has one.
    pub level: Option<f64>,
    /// Timestamps of the pivots that define the pattern, oldest first.
    pub pivots: Vec<NaiveDateTime>,
    /// Detector-specific measurements (depths, volume ratios, event counts).
    pub metrics: BTreeMap<String, f64>,
}

/// One scored detector match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSignal {
    pub instrument: InstrumentId,
    pub detector: DetectorKind,
    pub direction: Direction,
    pub anchor: NaiveDateTime,
    /// In `[0, 1]`.
    pub score: f64,
    /// Anchored on an incomplete live bar; may disappear once the session closes.
    pub provisional: bool,
    pub evidence: Evidence,
}

impl PatternSignal {
    /// Identity used when comparing passes: one signal per instrument and detector.
    pub fn key(&self) -> (InstrumentId, DetectorKind) {
        (self.instrument.clone(), self.detector)
    }
}
