//! Market-wide pattern scanner.
//!
//! One pass over the whole universe:
//! 1. Quality gate per instrument (history length, suspension, liquidity,
//!    duplicates, frame alignment); failures become `Skipped` diagnostics.
//! 2. Survivors are packed into a columnar `UniverseBatch`.
//! 3. Every (instrument, detector) pair is evaluated on a worker pool.
//! 4. Matches below `min_confidence` are dropped, never returned.
//! 5. Signals are sorted by descending score, ties broken by instrument,
//!    detector and anchor, so identical input gives identical output.

mod result;

pub use result::{Diagnostic, DiagnosticKind, ScanResult, Severity};

use crate::batch::{InstrumentView, UniverseBatch};
use crate::domain::{DetectorKind, Evidence, PatternSignal};
use crate::hybrid::UnifiedSeries;
use crate::indicators::IndicatorFrame;
use crate::patterns::{create_detector, Detector, DetectorParams};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid scan config: {0}")]
    InvalidConfig(String),

    #[error("failed to build scan thread pool: {0}")]
    ThreadPool(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Matches scoring below this are discarded.
    pub min_confidence: f64,
    /// Instruments with fewer bars are skipped.
    pub min_history: usize,
    /// Mean turnover over the last `turnover_window` closed bars must reach
    /// this; instruments reporting no turnover there are skipped. 0 disables.
    pub min_avg_turnover: f64,
    pub turnover_window: usize,
    /// 0 = global rayon pool, 1 = sequential, n = private pool of n threads.
    pub threads: usize,
    pub detectors: Vec<DetectorKind>,
    pub params: DetectorParams,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            min_history: 60,
            min_avg_turnover: 10_000_000.0,
            turnover_window: 5,
            threads: 0,
            detectors: DetectorKind::ALL.to_vec(),
            params: DetectorParams::default(),
        }
    }
}

/// One instrument's scan input: merged series plus its indicator frame.
#[derive(Debug, Clone)]
pub struct ScanInput {
    pub series: UnifiedSeries,
    pub frame: IndicatorFrame,
}

impl ScanInput {
    pub fn new(series: UnifiedSeries, frame: IndicatorFrame) -> Self {
        Self { series, frame }
    }
}

pub struct Scanner {
    config: ScanConfig,
    detectors: Vec<Box<dyn Detector>>,
    required_history: usize,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("detectors", &self.kinds())
            .field("min_confidence", &self.config.min_confidence)
            .field("required_history", &self.required_history)
            .finish()
    }
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        if !(0.0..=1.0).contains(&config.min_confidence) {
            return Err(ScanError::InvalidConfig(format!(
                "min_confidence must be within [0, 1], got {}",
                config.min_confidence
            )));
        }
        if !(config.min_avg_turnover.is_finite() && config.min_avg_turnover >= 0.0) {
            return Err(ScanError::InvalidConfig(format!(
                "min_avg_turnover must be >= 0, got {}",
                config.min_avg_turnover
            )));
        }
        if config.turnover_window == 0 {
            return Err(ScanError::InvalidConfig("turnover_window must be > 0".into()));
        }

        let kinds: BTreeSet<DetectorKind> = config.detectors.iter().copied().collect();
        let detectors: Vec<Box<dyn Detector>> = kinds
            .into_iter()
            .map(|kind| create_detector(kind, &config.params))
            .collect();
        let required_history = detectors
            .iter()
            .map(|d| d.warmup_bars())
            .fold(config.min_history, usize::max);

        let pool = if config.threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.threads)
                    .build()
                    .map_err(|e| ScanError::ThreadPool(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            config,
            detectors,
            required_history,
            pool,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Enabled detector kinds, in tie-break order.
    pub fn kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// Fewest bars an instrument needs to be scanned at all.
    pub fn required_history(&self) -> usize {
        self.required_history
    }

    /// Scan the universe in one batched pass.
    pub fn scan(&self, universe: &[ScanInput]) -> ScanResult {
        let start = Instant::now();
        let (batch, mut diagnostics) = self.build_batch(universe);

        let mut signals = match (&self.pool, self.config.threads) {
            (Some(pool), _) => pool.install(|| self.evaluate_parallel(&batch)),
            (None, 1) => self.evaluate_sequential(&batch),
            (None, _) => self.evaluate_parallel(&batch),
        };
        sort_signals(&mut signals);
        result::sort_diagnostics(&mut diagnostics);

        info!(
            instruments = universe.len(),
            scanned = batch.len(),
            signals = signals.len(),
            diagnostics = diagnostics.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "scan complete"
        );

        ScanResult {
            signals,
            diagnostics,
            instruments_scanned: batch.len(),
        }
    }

    /// Quality gate plus columnar packing.
    fn build_batch(&self, universe: &[ScanInput]) -> (UniverseBatch, Vec<Diagnostic>) {
        let total_bars = universe.iter().map(|u| u.series.len()).sum();
        let mut batch = UniverseBatch::with_capacity(universe.len(), total_bars);
        let mut diagnostics = Vec::new();
        let mut seen = BTreeSet::new();

        for input in universe {
            let instrument = input.series.instrument();
            let skip = if !seen.insert(instrument.clone()) {
                Some((DiagnosticKind::Duplicate, "instrument appears more than once".to_string()))
            } else if input.series.len() < self.required_history {
                Some((
                    DiagnosticKind::InsufficientHistory,
                    format!(
                        "{} bars, need at least {}",
                        input.series.len(),
                        self.required_history
                    ),
                ))
            } else if input.series.bars().last().is_some_and(|b| b.volume == 0) {
                Some((DiagnosticKind::Suspended, "zero volume on last bar".to_string()))
            } else if let Some(message) = self.illiquid(&input.series) {
                Some((DiagnosticKind::Illiquid, message))
            } else {
                batch
                    .push(&input.series, &input.frame)
                    .err()
                    .map(|e| (DiagnosticKind::FrameMismatch, e.to_string()))
            };

            if let Some((kind, message)) = skip {
                debug!(%instrument, %kind, %message, "instrument skipped");
                diagnostics.push(Diagnostic::skipped(instrument.clone(), kind, message));
            }
        }
        (batch, diagnostics)
    }

    /// Why the series fails the turnover floor, if it does. The open bar's
    /// partial turnover is not counted.
    fn illiquid(&self, series: &UnifiedSeries) -> Option<String> {
        if self.config.min_avg_turnover <= 0.0 {
            return None;
        }
        let closed = series.closed_bars();
        let window = &closed[closed.len().saturating_sub(self.config.turnover_window)..];
        let reported: Vec<f64> = window.iter().filter_map(|b| b.turnover).collect();
        if reported.is_empty() {
            return Some(format!("no turnover over the last {} bars", window.len()));
        }
        let mean = reported.iter().sum::<f64>() / reported.len() as f64;
        if mean < self.config.min_avg_turnover {
            return Some(format!(
                "mean turnover {mean:.0} below {:.0}",
                self.config.min_avg_turnover
            ));
        }
        None
    }

    fn evaluate_parallel(&self, batch: &UniverseBatch) -> Vec<PatternSignal> {
        (0..batch.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                let view = batch.view(i);
                self.detectors
                    .iter()
                    .filter_map(move |d| self.evaluate(&view, d.as_ref()))
            })
            .collect()
    }

    fn evaluate_sequential(&self, batch: &UniverseBatch) -> Vec<PatternSignal> {
        (0..batch.len())
            .flat_map(|i| {
                let view = batch.view(i);
                self.detectors
                    .iter()
                    .filter_map(move |d| self.evaluate(&view, d.as_ref()))
            })
            .collect()
    }

    /// Run one detector on one instrument and apply the confidence filter.
    fn evaluate(&self, view: &InstrumentView<'_>, detector: &dyn Detector) -> Option<PatternSignal> {
        if view.len() < detector.warmup_bars() {
            return None;
        }
        let detection = detector.detect(view)?;
        if !detection.score.is_finite() || detection.anchor >= view.len() {
            return None;
        }
        let score = detection.score.clamp(0.0, 1.0);
        if score < self.config.min_confidence {
            return None;
        }

        let pivots = detection
            .pivots
            .iter()
            .filter_map(|&i| view.timestamps.get(i).copied())
            .collect();
        Some(PatternSignal {
            instrument: view.instrument.clone(),
            detector: detector.kind(),
            direction: detection.direction,
            anchor: view.timestamps[detection.anchor],
            score,
            provisional: view.open_last && detection.anchor + 1 == view.len(),
            evidence: Evidence {
                level: detection.level,
                pivots,
                metrics: detection.metrics,
            },
        })
    }
}

fn sort_signals(signals: &mut [PatternSignal]) {
    signals.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.instrument.cmp(&b.instrument))
            .then_with(|| a.detector.cmp(&b.detector))
            .then_with(|| a.anchor.cmp(&b.anchor))
    });
}
