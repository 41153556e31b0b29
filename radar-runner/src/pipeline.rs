//! Scan pipeline: Bar Store + live quotes → merge → indicators → scanner.
//!
//! Per-instrument problems (unknown symbol, malformed history, a snapshot
//! that cannot be aligned) become diagnostics on the result. Only a
//! systemic store failure aborts the pass.

use crate::config::RadarConfig;
use crate::universe::Universe;
use radar_core::domain::InstrumentId;
use radar_core::hybrid::{merge, MergeConfig, MergeError, UnifiedSeries};
use radar_core::indicators::{IndicatorFrame, IndicatorParams};
use radar_core::live::{fetch_or_absent, QuoteSource};
use radar_core::scanner::{Diagnostic, DiagnosticKind, ScanError, ScanInput, ScanResult, Scanner};
use radar_core::store::{BarStore, StoreError};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("bar store failed: {0}")]
    Store(#[source] StoreError),

    #[error(transparent)]
    Scanner(#[from] ScanError),
}

pub struct ScanPipeline {
    store: Arc<dyn BarStore>,
    quotes: Option<Arc<dyn QuoteSource>>,
    merge: MergeConfig,
    lot_sizes: HashMap<InstrumentId, u32>,
    indicators: IndicatorParams,
    scanner: Scanner,
    max_bars: usize,
}

impl std::fmt::Debug for ScanPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanPipeline")
            .field("quotes", &self.quotes.as_ref().map(|q| q.name().to_string()))
            .field("scanner", &self.scanner)
            .field("max_bars", &self.max_bars)
            .finish()
    }
}

impl ScanPipeline {
    pub fn from_config(
        config: &RadarConfig,
        store: Arc<dyn BarStore>,
        quotes: Option<Arc<dyn QuoteSource>>,
    ) -> Result<Self, PipelineError> {
        Ok(Self {
            store,
            quotes,
            merge: config.merge.clone(),
            lot_sizes: HashMap::new(),
            indicators: config.indicators.clone(),
            scanner: Scanner::new(config.scan.clone())?,
            max_bars: config.history.max_bars,
        })
    }

    /// Use each instrument's lot size as its fallback volume ratio when a
    /// snapshot carries no reference overlap.
    pub fn with_universe(mut self, universe: &Universe) -> Self {
        self.lot_sizes = universe
            .instruments()
            .iter()
            .map(|i| (i.id.clone(), i.lot_size))
            .collect();
        self
    }

    fn merge_config(&self, id: &InstrumentId) -> Cow<'_, MergeConfig> {
        match self.lot_sizes.get(id) {
            Some(&lot) if lot > 0 => {
                let mut config = self.merge.clone();
                config.scale.default_volume_ratio = f64::from(lot);
                Cow::Owned(config)
            }
            _ => Cow::Borrowed(&self.merge),
        }
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn store(&self) -> &Arc<dyn BarStore> {
        &self.store
    }

    /// Scan the given instruments. Duplicate ids are reported by the scanner.
    pub fn run(&self, instruments: &[InstrumentId]) -> Result<ScanResult, PipelineError> {
        let start = Instant::now();
        let mut inputs = Vec::with_capacity(instruments.len());
        let mut diagnostics = Vec::new();

        for id in instruments {
            if let Some(input) = self.prepare(id, &mut diagnostics)? {
                inputs.push(input);
            }
        }

        let load_ms = start.elapsed().as_millis();
        let result = self.scanner.scan(&inputs).with_diagnostics(diagnostics);
        info!(
            requested = instruments.len(),
            loaded = inputs.len(),
            signals = result.len(),
            skipped = result.skipped_count(),
            degraded = result.degraded_count(),
            load_ms,
            total_ms = start.elapsed().as_millis(),
            "scan pass complete"
        );
        Ok(result)
    }

    fn prepare(
        &self,
        id: &InstrumentId,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<Option<ScanInput>, PipelineError> {
        let history = match self.store.get_history(id, None, None) {
            Ok(series) => series.tail(self.max_bars),
            Err(e) if e.is_systemic() => return Err(PipelineError::Store(e)),
            Err(StoreError::NotFound { .. }) => {
                diagnostics.push(Diagnostic::skipped(
                    id.clone(),
                    DiagnosticKind::NotFound,
                    "instrument is not in the bar store",
                ));
                return Ok(None);
            }
            Err(e) => {
                diagnostics.push(Diagnostic::skipped(
                    id.clone(),
                    DiagnosticKind::MalformedSeries,
                    e.to_string(),
                ));
                return Ok(None);
            }
        };

        let snapshot = self
            .quotes
            .as_deref()
            .and_then(|source| fetch_or_absent(source, id));

        let series = match merge(&history, snapshot.as_ref(), &self.merge_config(id)) {
            Ok(unified) => {
                if !unified.warnings.is_empty() {
                    debug!(instrument = %id, warnings = ?unified.warnings, "merge warnings");
                }
                unified
            }
            Err(e) => {
                warn!(instrument = %id, error = %e, "live snapshot rejected, scanning history only");
                let kind = match e {
                    MergeError::StaleSnapshot { .. } => DiagnosticKind::StaleSnapshot,
                    MergeError::Alignment(_) => DiagnosticKind::AlignmentFailed,
                };
                diagnostics.push(Diagnostic::degraded(id.clone(), kind, e.to_string()));
                UnifiedSeries::from_history(history)
            }
        };

        match IndicatorFrame::compute(series.bars(), &self.indicators) {
            Ok(frame) => Ok(Some(ScanInput::new(series, frame))),
            Err(e) => {
                diagnostics.push(Diagnostic::skipped(
                    id.clone(),
                    DiagnosticKind::InsufficientData,
                    e.to_string(),
                ));
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{contractions, instrument_series, rising};
    use radar_core::domain::{Bar, DetectorKind, LiveSnapshot, Series};
    use radar_core::live::StaticQuotes;
    use radar_core::scanner::Severity;
    use radar_core::store::MemoryBarStore;

    fn config() -> RadarConfig {
        let mut config = RadarConfig::default();
        config.scan.detectors = vec![DetectorKind::Vcp];
        config
    }

    struct FailingStore;

    impl BarStore for FailingStore {
        fn get_history(
            &self,
            _: &InstrumentId,
            _: Option<chrono::NaiveDateTime>,
            _: Option<chrono::NaiveDateTime>,
        ) -> Result<Series, StoreError> {
            Err(StoreError::Unavailable("disk detached".into()))
        }

        fn append_bar(&self, _: &InstrumentId, _: Bar) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk detached".into()))
        }

        fn instruments(&self) -> Result<Vec<InstrumentId>, StoreError> {
            Ok(vec![])
        }
    }

    #[test]
    fn unknown_instrument_is_skipped_not_fatal() {
        let store = Arc::new(MemoryBarStore::new());
        store.insert_series(instrument_series("600001", rising(80)));
        let pipeline = ScanPipeline::from_config(&config(), store, None).unwrap();

        let result = pipeline
            .run(&[InstrumentId::new("SH", "600001"), InstrumentId::new("SH", "699999")])
            .unwrap();
        assert_eq!(result.instruments_scanned, 1);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::NotFound);
        assert_eq!(result.diagnostics[0].severity, Severity::Skipped);
    }

    #[test]
    fn systemic_store_failure_aborts_the_pass() {
        let pipeline = ScanPipeline::from_config(&config(), Arc::new(FailingStore), None).unwrap();
        let err = pipeline.run(&[InstrumentId::new("SH", "600001")]).unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::Unavailable(_))));
    }

    #[test]
    fn tiny_history_is_insufficient_data() {
        let store = Arc::new(MemoryBarStore::new());
        store.insert_series(instrument_series("600002", rising(4)));
        let pipeline = ScanPipeline::from_config(&config(), store, None).unwrap();
        let result = pipeline.run(&[InstrumentId::new("SH", "600002")]).unwrap();
        assert_eq!(result.instruments_scanned, 0);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::InsufficientData);
    }

    #[test]
    fn live_breakout_is_provisional() {
        let store = Arc::new(MemoryBarStore::new());
        let series = instrument_series("600003", contractions());
        let last = series.last().unwrap().timestamp;
        store.insert_series(series);

        // 25 lots at the default ratio of 100 = 2500 shares
        let snapshot = LiveSnapshot::new(
            InstrumentId::new("SH", "600003"),
            last + chrono::Duration::days(1) + chrono::Duration::hours(10),
            99.0,
            25.0,
        );
        let quotes: Arc<dyn QuoteSource> = Arc::new(StaticQuotes::from_snapshots([snapshot]));
        let pipeline = ScanPipeline::from_config(&config(), store, Some(quotes)).unwrap();

        let result = pipeline.run(&[InstrumentId::new("SH", "600003")]).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.signals[0].provisional);
        assert_eq!(result.signals[0].detector, DetectorKind::Vcp);
    }

    #[test]
    fn universe_lot_size_scales_live_volume() {
        let store = Arc::new(MemoryBarStore::new());
        let series = instrument_series("600003", contractions());
        let last = series.last().unwrap().timestamp;
        store.insert_series(series);

        // 25 lots of 10 shares is only 250 shares, too thin for a breakout
        let snapshot = LiveSnapshot::new(
            InstrumentId::new("SH", "600003"),
            last + chrono::Duration::days(1) + chrono::Duration::hours(10),
            99.0,
            25.0,
        );
        let quotes: Arc<dyn QuoteSource> = Arc::new(StaticQuotes::from_snapshots([snapshot]));
        let universe = Universe::from_toml(
            "[[instrument]]\nexchange = \"SH\"\nsymbol = \"600003\"\nlot_size = 10",
        )
        .unwrap();
        let pipeline = ScanPipeline::from_config(&config(), store, Some(quotes))
            .unwrap()
            .with_universe(&universe);

        let result = pipeline.run(&[InstrumentId::new("SH", "600003")]).unwrap();
        assert_eq!(result.instruments_scanned, 1);
        assert!(result.is_empty());
    }

    #[test]
    fn stale_snapshot_degrades_to_history_only() {
        let store = Arc::new(MemoryBarStore::new());
        let series = instrument_series("600004", rising(80));
        let last = series.last().unwrap().timestamp;
        store.insert_series(series);

        let snapshot = LiveSnapshot::new(
            InstrumentId::new("SH", "600004"),
            last - chrono::Duration::days(20),
            50.0,
            10.0,
        );
        let quotes: Arc<dyn QuoteSource> = Arc::new(StaticQuotes::from_snapshots([snapshot]));
        let pipeline = ScanPipeline::from_config(&config(), store, Some(quotes)).unwrap();

        let result = pipeline.run(&[InstrumentId::new("SH", "600004")]).unwrap();
        assert_eq!(result.instruments_scanned, 1);
        assert_eq!(result.degraded_count(), 1);
        assert_eq!(result.diagnostics[0].kind, DiagnosticKind::StaleSnapshot);
    }
}
