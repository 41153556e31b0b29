//! Unit/scale alignment between the Bar Store and a live feed.
//!
//! Feeds disagree on volume units (shares vs lots of 100, sometimes 10 or
//! 1000) and on turnover units. The ratio is resolved from sessions both
//! sources report; without any overlap a configured default applies.

use serde::{Deserialize, Serialize};

use super::AlignmentError;

/// How a ratio should be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalePolicy {
    /// Volume ratio (stored units per feed unit) when no overlap exists.
    pub default_volume_ratio: f64,
    /// Turnover ratio when no overlap exists.
    pub default_turnover_ratio: f64,
    /// Unit bases the median ratio snaps to.
    pub canonical_ratios: Vec<f64>,
    /// Relative distance within which the median snaps to a canonical ratio.
    pub snap_tolerance: f64,
    /// Largest relative deviation of any sample from the median before the
    /// resolution is flagged as inconsistent.
    pub consistency_tolerance: f64,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self {
            default_volume_ratio: 100.0,
            default_turnover_ratio: 1.0,
            canonical_ratios: vec![1.0, 10.0, 100.0, 1000.0],
            snap_tolerance: 0.10,
            consistency_tolerance: 0.10,
        }
    }
}

/// Why a resolution is low-confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum LowConfidence {
    /// No session reported by both sources; the default ratio was used.
    NoOverlap,
    /// Samples disagree with each other by more than the tolerance.
    Inconsistent { max_deviation: f64 },
    /// The median is not near any canonical unit base; used as-is.
    Unsnapped { median: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleResolution {
    /// Multiply feed values by this to get stored units.
    pub ratio: f64,
    /// Number of overlapping sessions the ratio was resolved from.
    pub samples: usize,
    pub low_confidence: Option<LowConfidence>,
}

impl ScaleResolution {
    pub fn is_confident(&self) -> bool {
        self.low_confidence.is_none()
    }
}

/// Resolve a scale ratio from `(stored, feed)` pairs for the same sessions.
///
/// Pairs where either side is zero carry no unit information and are
/// ignored. The result is always a finite positive ratio; anything else is
/// an alignment error.
pub fn resolve_ratio(
    pairs: &[(f64, f64)],
    default_ratio: f64,
    policy: &ScalePolicy,
) -> Result<ScaleResolution, AlignmentError> {
    let mut ratios: Vec<f64> = pairs
        .iter()
        .filter(|(stored, feed)| *stored > 0.0 && *feed > 0.0)
        .map(|(stored, feed)| stored / feed)
        .filter(|r| r.is_finite())
        .collect();

    if ratios.is_empty() {
        if !(default_ratio.is_finite() && default_ratio > 0.0) {
            return Err(AlignmentError::UnresolvableScale {
                ratio: default_ratio,
            });
        }
        return Ok(ScaleResolution {
            ratio: default_ratio,
            samples: 0,
            low_confidence: Some(LowConfidence::NoOverlap),
        });
    }

    ratios.sort_by(f64::total_cmp);
    let median = median_of_sorted(&ratios);
    if !(median.is_finite() && median > 0.0) {
        return Err(AlignmentError::UnresolvableScale { ratio: median });
    }

    let max_deviation = ratios
        .iter()
        .map(|r| (r - median).abs() / median)
        .fold(0.0, f64::max);

    let snapped = policy
        .canonical_ratios
        .iter()
        .copied()
        .filter(|c| *c > 0.0 && ((median / c) - 1.0).abs() <= policy.snap_tolerance)
        .min_by(|a, b| ((median / a) - 1.0).abs().total_cmp(&((median / b) - 1.0).abs()));

    let (ratio, low_confidence) = match snapped {
        Some(c) if max_deviation <= policy.consistency_tolerance => (c, None),
        Some(c) => (c, Some(LowConfidence::Inconsistent { max_deviation })),
        None => (median, Some(LowConfidence::Unsnapped { median })),
    };

    Ok(ScaleResolution {
        ratio,
        samples: ratios.len(),
        low_confidence,
    })
}

fn median_of_sorted(values: &[f64]) -> f64 {
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
