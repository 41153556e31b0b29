//! AlphaRadar Runner: scan orchestration, sentinel service, configuration.
//!
//! This crate builds on `radar-core` to provide:
//! - `radar.toml` configuration with validated defaults
//! - Universe and watchlist files
//! - The scan pipeline (store + live quotes → merge → indicators → scanner)
//! - The sentinel: cadence-driven, per-watchlist diffing and alerts
//! - CSV/JSON export and fingerprinted artifact bundles
//! - Deterministic synthetic bars for demos

pub mod config;
pub mod export;
pub mod pipeline;
pub mod sentinel;
pub mod synthetic;
pub mod universe;

#[cfg(test)]
mod testutil;

pub use config::{ConfigError, RadarConfig};
pub use pipeline::{PipelineError, ScanPipeline};
pub use sentinel::{
    diff, Alert, AlertKind, CancelToken, Sentinel, TickOutcome, WatchlistId, WatchlistSource,
};
pub use synthetic::synthetic_series;
pub use universe::{Universe, UniverseError, Watchlists};
