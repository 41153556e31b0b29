//! Instrument reference data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Exchange + symbol. Ordered by exchange, then symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId {
    pub exchange: String,
    pub symbol: String,
}

impl InstrumentId {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.symbol, self.exchange)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum InstrumentError {
    #[error("invalid instrument id '{0}': expected SYMBOL.EXCHANGE")]
    InvalidId(String),
}

impl FromStr for InstrumentId {
    type Err = InstrumentError;

    /// Parses `SYMBOL.EXCHANGE`, e.g. `600519.SH`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('.') {
            Some((symbol, exchange)) if !symbol.is_empty() && !exchange.is_empty() => {
                Ok(Self::new(exchange.to_ascii_uppercase(), symbol))
            }
            _ => Err(InstrumentError::InvalidId(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    #[default]
    Listed,
    Suspended,
    Delisted,
}

/// Immutable reference data, created at universe load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    #[serde(flatten)]
    pub id: InstrumentId,
    /// Shares per lot. Quote feeds that report volume in lots are scaled by
    /// this when no reference overlap resolves the unit.
    #[serde(default = "default_lot_size")]
    pub lot_size: u32,
    #[serde(default)]
    pub status: ListingStatus,
}

fn default_lot_size() -> u32 {
    100
}

impl Instrument {
    pub fn new(id: InstrumentId) -> Self {
        Self {
            id,
            lot_size: default_lot_size(),
            status: ListingStatus::Listed,
        }
    }

    pub fn is_tradable(&self) -> bool {
        self.status == ListingStatus::Listed
    }
}
