//! In-memory Bar Store.

use super::{check_append, BarStore, StoreError, StoreStatus};
use crate::domain::{Bar, InstrumentId, Series};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

type Slot = Arc<RwLock<Vec<Bar>>>;

/// Bar Store held entirely in memory.
///
/// Each instrument has its own lock: appends to one instrument never block
/// reads of another, and a reader holds the lock for the whole copy.
#[derive(Debug, Default)]
pub struct MemoryBarStore {
    slots: RwLock<BTreeMap<InstrumentId, Slot>>,
}

impl MemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an instrument known without any bars.
    pub fn register(&self, instrument: &InstrumentId) {
        let mut slots = self.slots.write().unwrap();
        slots.entry(instrument.clone()).or_default();
    }

    /// Replace an instrument's whole history with a validated series.
    pub fn insert_series(&self, series: Series) {
        let instrument = series.instrument().clone();
        let slot = self.slot_or_register(&instrument);
        *slot.write().unwrap() = series.into_bars();
    }

    pub fn status(&self) -> Vec<StoreStatus> {
        let slots = self.slots.read().unwrap();
        slots
            .iter()
            .map(|(id, slot)| {
                let bars = slot.read().unwrap();
                StoreStatus {
                    instrument: id.clone(),
                    bar_count: bars.len(),
                    first: bars.first().map(|b| b.timestamp),
                    last: bars.last().map(|b| b.timestamp),
                }
            })
            .collect()
    }

    fn slot(&self, instrument: &InstrumentId) -> Option<Slot> {
        self.slots.read().unwrap().get(instrument).cloned()
    }

    fn slot_or_register(&self, instrument: &InstrumentId) -> Slot {
        if let Some(slot) = self.slot(instrument) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap();
        slots.entry(instrument.clone()).or_default().clone()
    }
}

impl BarStore for MemoryBarStore {
    fn get_history(
        &self,
        instrument: &InstrumentId,
        from: Option<NaiveDateTime>,
        to: Option<NaiveDateTime>,
    ) -> Result<Series, StoreError> {
        let slot = self.slot(instrument).ok_or_else(|| StoreError::NotFound {
            instrument: instrument.clone(),
        })?;
        let bars: Vec<Bar> = {
            let guard = slot.read().unwrap();
            guard
                .iter()
                .filter(|b| from.map_or(true, |f| b.timestamp >= f))
                .filter(|b| to.map_or(true, |t| b.timestamp <= t))
                .cloned()
                .collect()
        };
        Series::new(instrument.clone(), bars).map_err(|source| StoreError::Corrupt {
            instrument: instrument.clone(),
            source,
        })
    }

    fn append_bar(&self, instrument: &InstrumentId, bar: Bar) -> Result<(), StoreError> {
        let slot = self.slot_or_register(instrument);
        let mut bars = slot.write().unwrap();
        check_append(instrument, bars.last().map(|b| b.timestamp), &bar)?;
        bars.push(bar);
        Ok(())
    }

    fn instruments(&self) -> Result<Vec<InstrumentId>, StoreError> {
        Ok(self.slots.read().unwrap().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            timestamp: ts(day),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000,
            turnover: None,
        }
    }

    fn id() -> InstrumentId {
        InstrumentId::new("SZ", "000001")
    }

    #[test]
    fn unknown_instrument_is_not_found() {
        let store = MemoryBarStore::new();
        let err = store.get_history(&id(), None, None).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(!err.is_systemic());
    }

    #[test]
    fn registered_instrument_without_data_is_empty() {
        let store = MemoryBarStore::new();
        store.register(&id());
        let series = store.get_history(&id(), None, None).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn append_then_read_range() {
        let store = MemoryBarStore::new();
        store.append_bar(&id(), bar(2, 10.0)).unwrap();
        store.append_bar(&id(), bar(3, 11.0)).unwrap();
        store.append_bar(&id(), bar(4, 12.0)).unwrap();

        let all = store.get_history(&id(), None, None).unwrap();
        assert_eq!(all.len(), 3);

        let tail = store.get_history(&id(), Some(ts(3)), None).unwrap();
        assert_eq!(tail.len(), 2);

        let none = store.get_history(&id(), Some(ts(10)), None).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn append_rejects_out_of_order() {
        let store = MemoryBarStore::new();
        store.append_bar(&id(), bar(3, 11.0)).unwrap();
        let err = store.append_bar(&id(), bar(3, 12.0)).unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
        let err = store.append_bar(&id(), bar(2, 12.0)).unwrap_err();
        assert!(matches!(err, StoreError::OutOfOrder { .. }));
        assert_eq!(store.get_history(&id(), None, None).unwrap().len(), 1);
    }

    #[test]
    fn append_rejects_insane_bar() {
        let store = MemoryBarStore::new();
        let mut b = bar(2, 10.0);
        b.high = 5.0;
        let err = store.append_bar(&id(), b).unwrap_err();
        assert!(matches!(err, StoreError::InvalidBar { .. }));
    }

    #[test]
    fn concurrent_appends_to_distinct_instruments() {
        let store = Arc::new(MemoryBarStore::new());
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let id = InstrumentId::new("SH", format!("60000{n}"));
                    for day in 2..20 {
                        store.append_bar(&id, bar(day, 10.0 + day as f64)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let status = store.status();
        assert_eq!(status.len(), 4);
        assert!(status.iter().all(|s| s.bar_count == 18));
    }
}
