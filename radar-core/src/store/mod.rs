//! Bar Store: persistent per-instrument history.
//!
//! The `BarStore` trait abstracts over storage backends so the pipeline and
//! tests can swap an in-memory store for the Parquet one. Reads never observe
//! a partially appended bar; appends are serialized per instrument.

pub mod memory;
pub mod parquet;

pub use memory::MemoryBarStore;
pub use parquet::{ParquetBarStore, StoreMeta};

use crate::domain::{Bar, InstrumentId, Series, SeriesError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("instrument not found: {instrument}")]
    NotFound { instrument: InstrumentId },

    #[error("out-of-order bar for {instrument}: {timestamp} is not after last stored bar {last}")]
    OutOfOrder {
        instrument: InstrumentId,
        timestamp: NaiveDateTime,
        last: NaiveDateTime,
    },

    #[error("invalid bar for {instrument} at {timestamp}")]
    InvalidBar {
        instrument: InstrumentId,
        timestamp: NaiveDateTime,
    },

    #[error("stored history for {instrument} is malformed: {source}")]
    Corrupt {
        instrument: InstrumentId,
        #[source]
        source: SeriesError,
    },

    #[error("unreadable partition {} for {instrument}: {reason}", .path.display())]
    CorruptPartition {
        instrument: InstrumentId,
        path: PathBuf,
        reason: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),
}

impl StoreError {
    /// Systemic errors stop a scan pass; the rest are local to one instrument.
    pub fn is_systemic(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Parquet(_))
    }
}

/// Per-instrument summary used by `store status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub instrument: InstrumentId,
    pub bar_count: usize,
    pub first: Option<NaiveDateTime>,
    pub last: Option<NaiveDateTime>,
}

pub trait BarStore: Send + Sync {
    /// Bars with `from <= timestamp <= to`. Unknown instruments are
    /// `NotFound`; a known instrument with nothing in range yields an empty
    /// series.
    fn get_history(
        &self,
        instrument: &InstrumentId,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<Series, StoreError>;

    /// Append one bar. The timestamp must be strictly after the last stored bar.
    fn append_bar(&self, instrument: &InstrumentId, bar: Bar) -> Result<(), StoreError>;

    /// All known instruments, sorted.
    fn instruments(&self) -> Result<Vec<InstrumentId>, StoreError>;
}

/// Shared append validation for store implementations. `last` is the
/// timestamp of the newest stored bar.
pub(crate) fn check_append(
    instrument: &InstrumentId,
    last: Option<NaiveDateTime>,
    bar: &Bar,
) -> Result<(), StoreError> {
    if !bar.is_sane() {
        return Err(StoreError::InvalidBar {
            instrument: instrument.clone(),
            timestamp: bar.timestamp,
        });
    }
    if let Some(last) = last {
        if bar.timestamp <= last {
            return Err(StoreError::OutOfOrder {
                instrument: instrument.clone(),
                timestamp: bar.timestamp,
                last,
            });
        }
    }
    Ok(())
}
