//! Live quote interface.
//!
//! The `QuoteSource` trait abstracts over real-time feeds so the pipeline can
//! run against an HTTP adapter, a replay, or nothing at all. Every fetch
//! failure is downgraded to "no live data": the core then proceeds
//! history-only.

pub mod circuit_breaker;
pub mod http;

pub use circuit_breaker::CircuitBreaker;
pub use http::HttpQuoteSource;

use crate::domain::{InstrumentId, LiveSnapshot};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by quote source")]
    RateLimited,

    #[error("quote source refused the request (HTTP {status})")]
    Rejected { status: u16 },

    #[error("hard stop: quote source is blocked (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("malformed snapshot for {instrument}: {reason}")]
    Malformed {
        instrument: InstrumentId,
        reason: String,
    },

    #[error("quote source error: {0}")]
    Other(String),
}

/// Pull interface to a live quote feed.
pub trait QuoteSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Most recent snapshot, or `None` when the feed has nothing for the instrument.
    fn fetch_snapshot(&self, instrument: &InstrumentId)
        -> Result<Option<LiveSnapshot>, QuoteError>;
}

/// Fetch a snapshot, logging and discarding any error.
pub fn fetch_or_absent(source: &dyn QuoteSource, instrument: &InstrumentId) -> Option<LiveSnapshot> {
    match source.fetch_snapshot(instrument) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(source = source.name(), %instrument, error = %e, "live quote unavailable, using history only");
            None
        }
    }
}

/// Quote source backed by a fixed set of snapshots; used for replay and tests.
#[derive(Debug, Default)]
pub struct StaticQuotes {
    snapshots: RwLock<HashMap<InstrumentId, LiveSnapshot>>,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshots(snapshots: impl IntoIterator<Item = LiveSnapshot>) -> Self {
        let quotes = Self::new();
        for s in snapshots {
            quotes.set(s);
        }
        quotes
    }

    /// Insert or replace the snapshot for its instrument.
    pub fn set(&self, snapshot: LiveSnapshot) {
        self.snapshots
            .write()
            .unwrap()
            .insert(snapshot.instrument.clone(), snapshot);
    }

    pub fn clear(&self, instrument: &InstrumentId) {
        self.snapshots.write().unwrap().remove(instrument);
    }
}

impl QuoteSource for StaticQuotes {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch_snapshot(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Option<LiveSnapshot>, QuoteError> {
        Ok(self.snapshots.read().unwrap().get(instrument).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    struct FailingSource;

    impl QuoteSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        fn fetch_snapshot(
            &self,
            _instrument: &InstrumentId,
        ) -> Result<Option<LiveSnapshot>, QuoteError> {
            Err(QuoteError::NetworkUnreachable("connection refused".into()))
        }
    }

    fn id() -> InstrumentId {
        InstrumentId::new("SZ", "000001")
    }

    #[test]
    fn failure_is_treated_as_absent() {
        assert!(fetch_or_absent(&FailingSource, &id()).is_none());
    }

    #[test]
    fn static_quotes_serve_and_clear() {
        let snap = LiveSnapshot::new(
            id(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            11.0,
            500.0,
        );
        let quotes = StaticQuotes::from_snapshots([snap.clone()]);
        assert_eq!(fetch_or_absent(&quotes, &id()), Some(snap));
        quotes.clear(&id());
        assert_eq!(fetch_or_absent(&quotes, &id()), None);
    }
}
