//! Provider-agnostic JSON-over-HTTP quote adapter.
//!
//! `GET {base_url}/{exchange}/{symbol}` must answer with a `LiveSnapshot`
//! JSON document, or 404/204 when there is no live data. Any adapter that
//! speaks to a concrete vendor sits behind such an endpoint.

use super::{CircuitBreaker, QuoteError, QuoteSource};
use crate::domain::{InstrumentId, LiveSnapshot};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct HttpQuoteSource {
    client: reqwest::blocking::Client,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl HttpQuoteSource {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, QuoteError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QuoteError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            circuit_breaker,
        })
    }

    fn snapshot_url(&self, instrument: &InstrumentId) -> String {
        format!(
            "{}/{}/{}",
            self.base_url, instrument.exchange, instrument.symbol
        )
    }
}

impl QuoteSource for HttpQuoteSource {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch_snapshot(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Option<LiveSnapshot>, QuoteError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(QuoteError::CircuitBreakerTripped);
        }

        let url = self.snapshot_url(instrument);
        let resp = self.client.get(&url).send().map_err(|e| {
            self.circuit_breaker.record_failure();
            QuoteError::NetworkUnreachable(e.to_string())
        })?;

        let status = resp.status();
        if status == StatusCode::FORBIDDEN {
            self.circuit_breaker.trip();
            return Err(QuoteError::CircuitBreakerTripped);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            return Err(QuoteError::RateLimited);
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            self.circuit_breaker.record_success();
            debug!(%instrument, "no live snapshot");
            return Ok(None);
        }
        if !status.is_success() {
            self.circuit_breaker.record_failure();
            return Err(QuoteError::Rejected {
                status: status.as_u16(),
            });
        }

        let snapshot: LiveSnapshot = resp.json().map_err(|e| QuoteError::Malformed {
            instrument: instrument.clone(),
            reason: e.to_string(),
        })?;
        if snapshot.instrument != *instrument {
            return Err(QuoteError::Malformed {
                instrument: instrument.clone(),
                reason: format!("response is for {}", snapshot.instrument),
            });
        }

        self.circuit_breaker.record_success();
        Ok(Some(snapshot))
    }
}
