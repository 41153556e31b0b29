//! Parquet Bar Store with Hive-style partitioning.
//!
//! Layout: `{root}/exchange={EX}/symbol={SYM}/{year}.parquet`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place), so readers only ever
//!   see whole partitions
//! - Per-instrument write lock on the append path
//! - Metadata sidecar per instrument (range, bar count, chained content hash)
//! - Quarantine for corrupt files ({filename}.quarantined); reads and appends
//!   fail on a quarantined instrument until its series is rewritten

use super::{check_append, BarStore, StoreError, StoreStatus};
use crate::domain::{Bar, InstrumentId, Series};
use chrono::{DateTime, Datelike, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const META_FILE: &str = "meta.json";

/// Metadata sidecar for a stored instrument.
///
/// `data_hash` is a blake3 chain over the stored bars in order, so an append
/// extends it without rereading history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub instrument: InstrumentId,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
    pub bar_count: usize,
    pub data_hash: String,
    pub updated_at: NaiveDateTime,
}

impl StoreMeta {
    fn empty(instrument: &InstrumentId) -> Self {
        Self {
            instrument: instrument.clone(),
            first: None,
            last: None,
            bar_count: 0,
            data_hash: String::new(),
            updated_at: chrono::Local::now().naive_local(),
        }
    }
}

/// The Parquet-backed store.
pub struct ParquetBarStore {
    root: PathBuf,
    write_locks: Mutex<HashMap<InstrumentId, Arc<Mutex<()>>>>,
}

impl ParquetBarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/exchange={EX}/symbol={SYM}/`
    fn instrument_dir(&self, instrument: &InstrumentId) -> PathBuf {
        self.root
            .join(format!("exchange={}", instrument.exchange))
            .join(format!("symbol={}", instrument.symbol))
    }

    fn year_path(&self, instrument: &InstrumentId, year: i32) -> PathBuf {
        self.instrument_dir(instrument)
            .join(format!("{year}.parquet"))
    }

    fn meta_path(&self, instrument: &InstrumentId) -> PathBuf {
        self.instrument_dir(instrument).join(META_FILE)
    }

    fn write_lock(&self, instrument: &InstrumentId) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap();
        locks.entry(instrument.clone()).or_default().clone()
    }

    /// Make an instrument known without any bars.
    pub fn register(&self, instrument: &InstrumentId) -> Result<(), StoreError> {
        let lock = self.write_lock(instrument);
        let _guard = lock.lock().unwrap();
        let dir = self.instrument_dir(instrument);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", dir.display())))?;
        if self.get_meta(instrument).is_none() {
            self.write_meta(&StoreMeta::empty(instrument))?;
        }
        Ok(())
    }

    /// Replace an instrument's stored history with `series`.
    pub fn write_series(&self, series: &Series) -> Result<(), StoreError> {
        let instrument = series.instrument();
        let lock = self.write_lock(instrument);
        let _guard = lock.lock().unwrap();

        let dir = self.instrument_dir(instrument);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", dir.display())))?;

        let mut by_year: BTreeMap<i32, Vec<&Bar>> = BTreeMap::new();
        for bar in series.bars() {
            by_year.entry(bar.timestamp.year()).or_default().push(bar);
        }

        for (year, bars) in &by_year {
            write_partition(&self.year_path(instrument, *year), bars)?;
        }

        // Drop partitions the new history no longer covers.
        for (year, path) in self.partitions(instrument)? {
            if !by_year.contains_key(&year) {
                fs::remove_file(&path).map_err(|e| {
                    StoreError::Unavailable(format!("remove {}: {e}", path.display()))
                })?;
            }
        }
        // A full rewrite supersedes anything previously quarantined.
        while let Some(path) = self.quarantined(instrument) {
            fs::remove_file(&path).map_err(|e| {
                StoreError::Unavailable(format!("remove {}: {e}", path.display()))
            })?;
        }

        let mut hash = String::new();
        for bar in series.bars() {
            hash = chain_hash(&hash, bar)?;
        }
        self.write_meta(&StoreMeta {
            instrument: instrument.clone(),
            first: series.bars().first().map(|b| b.timestamp),
            last: series.last().map(|b| b.timestamp),
            bar_count: series.len(),
            data_hash: hash,
            updated_at: chrono::Local::now().naive_local(),
        })?;

        debug!(%instrument, bars = series.len(), "wrote series");
        Ok(())
    }

    pub fn get_meta(&self, instrument: &InstrumentId) -> Option<StoreMeta> {
        let content = fs::read_to_string(self.meta_path(instrument)).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_meta(&self, meta: &StoreMeta) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| StoreError::Unavailable(format!("meta serialization: {e}")))?;
        let path = self.meta_path(&meta.instrument);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| StoreError::Unavailable(format!("meta write: {e}")))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StoreError::Unavailable(format!("meta rename: {e}"))
        })
    }

    /// Year partitions present on disk, sorted by year.
    fn partitions(&self, instrument: &InstrumentId) -> Result<Vec<(i32, PathBuf)>, StoreError> {
        let dir = self.instrument_dir(instrument);
        let entries = fs::read_dir(&dir)
            .map_err(|e| StoreError::Unavailable(format!("read {}: {e}", dir.display())))?;

        let mut parts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Unavailable(format!("dir entry: {e}")))?;
            let path = entry.path();
            // Skip meta.json, .tmp and .quarantined files
            if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
                continue;
            }
            let year = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<i32>().ok());
            if let Some(year) = year {
                parts.push((year, path));
            }
        }
        parts.sort_by_key(|(year, _)| *year);
        Ok(parts)
    }

    /// A partition set aside by an earlier failed read, if any.
    fn quarantined(&self, instrument: &InstrumentId) -> Option<PathBuf> {
        let entries = fs::read_dir(self.instrument_dir(instrument)).ok()?;
        entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("quarantined"))
            .min()
    }

    /// Load a partition. An unreadable file is quarantined and reported, so
    /// callers never see history with a year silently missing.
    fn load_partition(
        &self,
        instrument: &InstrumentId,
        path: &Path,
    ) -> Result<Vec<Bar>, StoreError> {
        load_and_validate_parquet(path).map_err(|e| {
            let quarantine = path.with_extension("parquet.quarantined");
            warn!(path = %path.display(), error = %e, "quarantining corrupt partition");
            let _ = fs::rename(path, &quarantine);
            StoreError::CorruptPartition {
                instrument: instrument.clone(),
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }

    fn ensure_readable(&self, instrument: &InstrumentId) -> Result<(), StoreError> {
        match self.quarantined(instrument) {
            Some(path) => Err(StoreError::CorruptPartition {
                instrument: instrument.clone(),
                path,
                reason: "partition is quarantined; rewrite the series to recover".into(),
            }),
            None => Ok(()),
        }
    }

    /// Newest stored timestamp. The sidecar and the newest partition must
    /// agree on where history ends; a partition the sidecar points at that
    /// cannot be read is an error.
    fn last_timestamp(
        &self,
        instrument: &InstrumentId,
        meta: Option<&StoreMeta>,
    ) -> Result<Option<NaiveDateTime>, StoreError> {
        let recorded = meta.and_then(|m| m.last);
        let year = match (recorded, meta) {
            (Some(ts), _) => ts.year(),
            (None, Some(_)) => return Ok(None),
            (None, None) => match self.partitions(instrument)?.last() {
                Some((year, _)) => *year,
                None => return Ok(None),
            },
        };
        let path = self.year_path(instrument, year);
        if !path.exists() {
            return Err(StoreError::CorruptPartition {
                instrument: instrument.clone(),
                path,
                reason: "partition named by meta.json is missing".into(),
            });
        }
        let stored = self
            .load_partition(instrument, &path)?
            .last()
            .map(|b| b.timestamp);
        Ok(stored.max(recorded))
    }

    pub fn status(&self) -> Result<Vec<StoreStatus>, StoreError> {
        let mut out = Vec::new();
        for instrument in self.instruments()? {
            let meta = self.get_meta(&instrument);
            out.push(StoreStatus {
                bar_count: meta.as_ref().map_or(0, |m| m.bar_count),
                first: meta.as_ref().and_then(|m| m.first),
                last: meta.as_ref().and_then(|m| m.last),
                instrument,
            });
        }
        Ok(out)
    }
}

impl BarStore for ParquetBarStore {
    fn get_history(
        &self,
        instrument: &InstrumentId,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<Series, StoreError> {
        if !self.instrument_dir(instrument).is_dir() {
            return Err(StoreError::NotFound {
                instrument: instrument.clone(),
            });
        }

        self.ensure_readable(instrument)?;
        let mut bars = Vec::new();
        for (year, path) in self.partitions(instrument)? {
            if from.is_some_and(|f| year < f.year()) || to.is_some_and(|t| year > t.year()) {
                continue;
            }
            bars.extend(
                self.load_partition(instrument, &path)?
                    .into_iter()
                    .filter(|b| from.map_or(true, |f| b.timestamp >= f))
                    .filter(|b| to.map_or(true, |t| b.timestamp <= t)),
            );
        }

        Series::new(instrument.clone(), bars).map_err(|source| StoreError::Corrupt {
            instrument: instrument.clone(),
            source,
        })
    }

    fn append_bar(&self, instrument: &InstrumentId, bar: Bar) -> Result<(), StoreError> {
        let lock = self.write_lock(instrument);
        let _guard = lock.lock().unwrap();

        let dir = self.instrument_dir(instrument);
        fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Unavailable(format!("create {}: {e}", dir.display())))?;

        self.ensure_readable(instrument)?;
        let meta = self.get_meta(instrument);
        let last = self.last_timestamp(instrument, meta.as_ref())?;
        check_append(instrument, last, &bar)?;

        let year = bar.timestamp.year();
        let path = self.year_path(instrument, year);
        let mut partition = if path.exists() {
            self.load_partition(instrument, &path)?
        } else {
            Vec::new()
        };
        partition.push(bar.clone());
        let refs: Vec<&Bar> = partition.iter().collect();
        write_partition(&path, &refs)?;

        let mut meta = meta.unwrap_or_else(|| StoreMeta::empty(instrument));
        meta.first = meta.first.or(Some(bar.timestamp));
        meta.last = Some(bar.timestamp);
        meta.bar_count += 1;
        meta.data_hash = chain_hash(&meta.data_hash, &bar)?;
        meta.updated_at = chrono::Local::now().naive_local();
        self.write_meta(&meta)
    }

    fn instruments(&self) -> Result<Vec<InstrumentId>, StoreError> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        let read = |dir: &Path| {
            fs::read_dir(dir)
                .map_err(|e| StoreError::Unavailable(format!("read {}: {e}", dir.display())))
        };
        for ex_entry in read(&self.root)? {
            let ex_entry = ex_entry.map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let ex_name = ex_entry.file_name().to_string_lossy().to_string();
            let Some(exchange) = ex_name.strip_prefix("exchange=") else {
                continue;
            };
            for sym_entry in read(&ex_entry.path())? {
                let sym_entry = sym_entry.map_err(|e| StoreError::Unavailable(e.to_string()))?;
                let sym_name = sym_entry.file_name().to_string_lossy().to_string();
                if let Some(symbol) = sym_name.strip_prefix("symbol=") {
                    out.push(InstrumentId::new(exchange, symbol));
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

fn chain_hash(prev: &str, bar: &Bar) -> Result<String, StoreError> {
    let bytes = serde_json::to_vec(bar)
        .map_err(|e| StoreError::Unavailable(format!("hash serialization: {e}")))?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev.as_bytes());
    hasher.update(&bytes);
    Ok(hasher.finalize().to_hex().to_string())
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

const COLUMNS: [&str; 7] = [
    "timestamp", "open", "high", "low", "close", "volume", "turnover",
];

fn write_partition(path: &Path, bars: &[&Bar]) -> Result<(), StoreError> {
    let mut df = bars_to_dataframe(bars)?;
    let tmp = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp)
        .map_err(|e| StoreError::Parquet(format!("create {}: {e}", tmp.display())))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::Parquet(format!("atomic rename failed: {e}"))
    })
}

fn bars_to_dataframe(bars: &[&Bar]) -> Result<DataFrame, StoreError> {
    let timestamps: Vec<i64> = bars
        .iter()
        .map(|b| b.timestamp.and_utc().timestamp_millis())
        .collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<u64> = bars.iter().map(|b| b.volume).collect();
    let turnovers: Vec<Option<f64>> = bars.iter().map(|b| b.turnover).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("turnover".into(), turnovers),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn load_and_validate_parquet(path: &Path) -> Result<Vec<Bar>, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(StoreError::Parquet("empty parquet file".into()));
    }
    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(StoreError::Parquet(format!("missing column '{name}'")));
        }
    }

    dataframe_to_bars(&df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>, StoreError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| StoreError::Parquet(format!("column read: {e}")))
    };
    let type_err = |name: &'static str| {
        move |e: PolarsError| StoreError::Parquet(format!("{name} column type: {e}"))
    };

    let ts_ca = col("timestamp")?.i64().map_err(type_err("timestamp"))?;
    let open_ca = col("open")?.f64().map_err(type_err("open"))?;
    let high_ca = col("high")?.f64().map_err(type_err("high"))?;
    let low_ca = col("low")?.f64().map_err(type_err("low"))?;
    let close_ca = col("close")?.f64().map_err(type_err("close"))?;
    let vol_ca = col("volume")?.u64().map_err(type_err("volume"))?;
    let turnover_ca = col("turnover")?.f64().map_err(type_err("turnover"))?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let millis = ts_ca
            .get(i)
            .ok_or_else(|| StoreError::Parquet(format!("null timestamp at row {i}")))?;
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| StoreError::Parquet(format!("timestamp out of range at row {i}")))?
            .naive_utc();
        bars.push(Bar {
            timestamp,
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close: close_ca.get(i).unwrap_or(f64::NAN),
            volume: vol_ca.get(i).unwrap_or(0),
            turnover: turnover_ca.get(i),
        });
    }
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}
