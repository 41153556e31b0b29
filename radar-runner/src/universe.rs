//! Universe and watchlist files.
//!
//! `universe.toml` lists the instruments the radar knows about:
//!
//! ```toml
//! [[instrument]]
//! exchange = "SH"
//! symbol = "600519"
//! lot_size = 100
//! status = "listed"
//! ```
//!
//! `watchlists.toml` maps watchlist ids to `SYMBOL.EXCHANGE` entries:
//!
//! ```toml
//! [watchlists]
//! breakouts = ["600519.SH", "000001.SZ"]
//! ```

use crate::sentinel::{WatchlistId, WatchlistSource};
use radar_core::domain::{Instrument, InstrumentError, InstrumentId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: toml::de::Error,
    },

    #[error("watchlist '{watchlist}': {source}")]
    BadEntry {
        watchlist: String,
        #[source]
        source: InstrumentError,
    },

    #[error("duplicate instrument {0} in universe")]
    Duplicate(InstrumentId),
}

fn read(path: &Path) -> Result<String, UniverseError> {
    std::fs::read_to_string(path).map_err(|source| UniverseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Universe {
    #[serde(default, rename = "instrument")]
    instruments: Vec<Instrument>,
}

impl Universe {
    pub fn new(instruments: Vec<Instrument>) -> Result<Self, UniverseError> {
        let mut seen = BTreeSet::new();
        for inst in &instruments {
            if !seen.insert(&inst.id) {
                return Err(UniverseError::Duplicate(inst.id.clone()));
            }
        }
        Ok(Self { instruments })
    }

    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        Self::from_toml(&read(path)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        let parsed: Universe = toml::from_str(content).map_err(|source| UniverseError::Parse {
            what: "universe",
            source,
        })?;
        Self::new(parsed.instruments)
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn get(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.iter().find(|i| &i.id == id)
    }

    /// Ids of instruments that are currently listed, sorted.
    pub fn tradable_ids(&self) -> Vec<InstrumentId> {
        let mut ids: Vec<InstrumentId> = self
            .instruments
            .iter()
            .filter(|i| i.is_tradable())
            .map(|i| i.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

#[derive(Debug, Deserialize)]
struct WatchlistFile {
    #[serde(default)]
    watchlists: BTreeMap<String, Vec<String>>,
}

/// Parsed watchlist file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Watchlists {
    lists: BTreeMap<WatchlistId, BTreeSet<InstrumentId>>,
}

impl Watchlists {
    pub fn from_file(path: &Path) -> Result<Self, UniverseError> {
        Self::from_toml(&read(path)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, UniverseError> {
        let file: WatchlistFile = toml::from_str(content).map_err(|source| UniverseError::Parse {
            what: "watchlists",
            source,
        })?;
        let mut lists = BTreeMap::new();
        for (name, entries) in file.watchlists {
            let ids = entries
                .iter()
                .map(|e| e.parse::<InstrumentId>())
                .collect::<Result<BTreeSet<_>, _>>()
                .map_err(|source| UniverseError::BadEntry {
                    watchlist: name.clone(),
                    source,
                })?;
            lists.insert(WatchlistId::new(name), ids);
        }
        Ok(Self { lists })
    }

    pub fn insert(&mut self, id: WatchlistId, instruments: impl IntoIterator<Item = InstrumentId>) {
        self.lists.insert(id, instruments.into_iter().collect());
    }

    pub fn remove(&mut self, id: &WatchlistId) -> bool {
        self.lists.remove(id).is_some()
    }

    pub fn get(&self, id: &WatchlistId) -> Option<&BTreeSet<InstrumentId>> {
        self.lists.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &WatchlistId> {
        self.lists.keys()
    }
}

impl WatchlistSource for Watchlists {
    fn watchlists(&self) -> BTreeMap<WatchlistId, BTreeSet<InstrumentId>> {
        self.lists.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_core::domain::ListingStatus;

    #[test]
    fn parses_universe_with_defaults() {
        let universe = Universe::from_toml(
            r#"
            [[instrument]]
            exchange = "SH"
            symbol = "600519"

            [[instrument]]
            exchange = "SZ"
            symbol = "000001"
            lot_size = 200
            status = "suspended"
            "#,
        )
        .unwrap();
        assert_eq!(universe.len(), 2);
        let moutai = universe.get(&InstrumentId::new("SH", "600519")).unwrap();
        assert_eq!(moutai.lot_size, 100);
        assert_eq!(moutai.status, ListingStatus::Listed);
        assert_eq!(universe.tradable_ids(), vec![InstrumentId::new("SH", "600519")]);
    }

    #[test]
    fn duplicate_instrument_rejected() {
        let err = Universe::from_toml(
            r#"
            [[instrument]]
            exchange = "SH"
            symbol = "600519"
            [[instrument]]
            exchange = "SH"
            symbol = "600519"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, UniverseError::Duplicate(_)));
    }

    #[test]
    fn parses_watchlists() {
        let lists = Watchlists::from_toml(
            r#"
            [watchlists]
            breakouts = ["600519.SH", "000001.sz"]
            banks = ["601398.SH"]
            "#,
        )
        .unwrap();
        let breakouts = lists.get(&WatchlistId::new("breakouts")).unwrap();
        assert!(breakouts.contains(&InstrumentId::new("SZ", "000001")));
        assert_eq!(lists.watchlists().len(), 2);
    }

    #[test]
    fn bad_watchlist_entry_names_the_list() {
        let err = Watchlists::from_toml("[watchlists]\nbroken = [\"600519\"]").unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
