//! Scan results and per-instrument diagnostics.

use crate::domain::{InstrumentId, PatternSignal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Whether a diagnosed instrument was dropped or scanned with reduced input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Excluded from the scan.
    Skipped,
    /// Scanned, but on history only or with a fallback.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    NotFound,
    MalformedSeries,
    InsufficientHistory,
    InsufficientData,
    Suspended,
    Illiquid,
    Duplicate,
    FrameMismatch,
    StaleSnapshot,
    AlignmentFailed,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::NotFound => "not_found",
            DiagnosticKind::MalformedSeries => "malformed_series",
            DiagnosticKind::InsufficientHistory => "insufficient_history",
            DiagnosticKind::InsufficientData => "insufficient_data",
            DiagnosticKind::Suspended => "suspended",
            DiagnosticKind::Illiquid => "illiquid",
            DiagnosticKind::Duplicate => "duplicate",
            DiagnosticKind::FrameMismatch => "frame_mismatch",
            DiagnosticKind::StaleSnapshot => "stale_snapshot",
            DiagnosticKind::AlignmentFailed => "alignment_failed",
        };
        f.write_str(s)
    }
}

/// Why one instrument was skipped or degraded in a scan pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub instrument: InstrumentId,
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn skipped(instrument: InstrumentId, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            instrument,
            kind,
            severity: Severity::Skipped,
            message: message.into(),
        }
    }

    pub fn degraded(
        instrument: InstrumentId,
        kind: DiagnosticKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            instrument,
            kind,
            severity: Severity::Degraded,
            message: message.into(),
        }
    }

    fn sort_key(&self) -> (&InstrumentId, Severity, DiagnosticKind) {
        (&self.instrument, self.severity, self.kind)
    }
}

/// Output of one scan pass.
///
/// `signals` is sorted by descending score, then instrument, detector and
/// anchor; `diagnostics` by instrument. Two passes over identical input
/// compare equal and share a fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub signals: Vec<PatternSignal>,
    pub diagnostics: Vec<Diagnostic>,
    /// Instruments that reached the detectors.
    pub instruments_scanned: usize,
}

impl ScanResult {
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Distinct instruments excluded from the pass.
    pub fn skipped_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Skipped)
            .map(|d| &d.instrument)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn degraded_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Degraded)
            .map(|d| &d.instrument)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn signals_for<'a>(
        &'a self,
        instrument: &'a InstrumentId,
    ) -> impl Iterator<Item = &'a PatternSignal> + 'a {
        self.signals.iter().filter(move |s| &s.instrument == instrument)
    }

    /// Merge diagnostics recorded before the scan (store reads, merges).
    pub fn with_diagnostics(mut self, extra: Vec<Diagnostic>) -> Self {
        self.diagnostics.extend(extra);
        sort_diagnostics(&mut self.diagnostics);
        self
    }

    /// BLAKE3 digest of the canonical JSON of the signal list.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(&self.signals).unwrap_or_default();
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}

pub(crate) fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(symbol: &str) -> InstrumentId {
        InstrumentId::new("SZ", symbol)
    }

    #[test]
    fn skipped_count_is_per_instrument() {
        let result = ScanResult::default().with_diagnostics(vec![
            Diagnostic::skipped(id("000002"), DiagnosticKind::Suspended, "zero volume"),
            Diagnostic::degraded(id("000001"), DiagnosticKind::StaleSnapshot, "history only"),
            Diagnostic::skipped(id("000001"), DiagnosticKind::InsufficientHistory, "12 bars"),
            Diagnostic::skipped(id("000001"), DiagnosticKind::Duplicate, "again"),
        ]);
        assert_eq!(result.skipped_count(), 2);
        assert_eq!(result.degraded_count(), 1);
        assert_eq!(result.diagnostics[0].instrument, id("000001"));
        assert_eq!(result.diagnostics[0].severity, Severity::Skipped);
        assert_eq!(result.diagnostics[3].instrument, id("000002"));
    }

    #[test]
    fn empty_results_share_a_fingerprint() {
        let a = ScanResult::default();
        let b = ScanResult {
            instruments_scanned: 10,
            ..ScanResult::default()
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
