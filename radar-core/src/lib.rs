//! AlphaRadar Core: bar storage, hybrid data engine, indicators, pattern scanner.
//!
//! This crate contains the analytical heart of the radar:
//! - Domain types (instruments, bars, series, live snapshots, signals)
//! - Bar Store trait with in-memory and Parquet-backed implementations
//! - Live quote interface with an HTTP pull adapter and circuit breaker
//! - Hybrid Data Engine: history + live snapshot merge with unit alignment
//! - Indicator Library (EMA, MACD, KDJ, RSI, ATR, volatility) with explicit warm-up
//! - Pattern detectors (VCP, double bottom, triangle, resonance, spring)
//! - Columnar batch scanner with strict filtering and deterministic ordering

pub mod batch;
pub mod domain;
pub mod hybrid;
pub mod indicators;
pub mod live;
pub mod patterns;
pub mod scanner;
pub mod store;
