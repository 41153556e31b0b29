//! Synthetic daily bars for demos and store smoke tests.
//!
//! A random walk seeded from the instrument id, so the same instrument always
//! gets the same bars. Sessions follow the trading calendar. These bars are
//! fake and must never be mixed into a real store.

use chrono::NaiveDate;
use radar_core::domain::{Bar, InstrumentId, Series, SeriesError, TradingCalendar};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Session close time stamped on every synthetic bar.
const CLOSE_HOUR: u32 = 15;

pub fn synthetic_series(
    instrument: &InstrumentId,
    start: NaiveDate,
    sessions: usize,
    calendar: &TradingCalendar,
) -> Result<Series, SeriesError> {
    let seed_bytes = blake3::hash(instrument.to_string().as_bytes());
    let mut rng = StdRng::from_seed(*seed_bytes.as_bytes());

    let mut bars = Vec::with_capacity(sessions);
    let mut price: f64 = rng.gen_range(5.0..150.0);
    let mut day = calendar.session_on_or_before(start);
    if day < start {
        day = calendar.next_session(day);
    }

    for _ in 0..sessions {
        let daily_return: f64 = rng.gen_range(-0.04..0.04);
        let open = price * (1.0 + rng.gen_range(-0.01..0.01));
        let close = (price * (1.0 + daily_return)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.015));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.015));
        // Liquid names: turnover is drawn first and volume follows from price.
        let turnover: f64 = rng.gen_range(20_000_000.0..800_000_000.0);
        let volume = (turnover / ((open + close) / 2.0)).round().max(1.0) as u64;

        bars.push(Bar {
            timestamp: day.and_hms_opt(CLOSE_HOUR, 0, 0).unwrap_or_default(),
            open,
            high,
            low,
            close,
            volume,
            turnover: Some(turnover),
        });
        price = close;
        day = calendar.next_session(day);
    }

    Series::new(instrument.clone(), bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        // A Saturday
        NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()
    }

    #[test]
    fn synthetic_data_is_deterministic() {
        let cal = TradingCalendar::default();
        let id = InstrumentId::new("SH", "600000");
        let a = synthetic_series(&id, start(), 120, &cal).unwrap();
        let b = synthetic_series(&id, start(), 120, &cal).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 120);
    }

    #[test]
    fn different_instruments_get_different_bars() {
        let cal = TradingCalendar::default();
        let a = synthetic_series(&InstrumentId::new("SH", "600000"), start(), 30, &cal).unwrap();
        let b = synthetic_series(&InstrumentId::new("SZ", "000001"), start(), 30, &cal).unwrap();
        assert_ne!(a.bars()[0].close, b.bars()[0].close);
    }

    #[test]
    fn bars_fall_on_sessions_only() {
        let holiday = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let cal = TradingCalendar::new([holiday]);
        let series = synthetic_series(&InstrumentId::new("SH", "600000"), start(), 40, &cal).unwrap();
        assert_eq!(
            series.bars()[0].session(),
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()
        );
        assert!(series.bars().iter().all(|b| cal.is_session(b.session())));
        assert!(series.bars().iter().all(|b| b.is_sane()));
    }

    #[test]
    fn synthetic_names_clear_the_default_turnover_floor() {
        let cal = TradingCalendar::default();
        let series = synthetic_series(&InstrumentId::new("SZ", "000001"), start(), 60, &cal).unwrap();
        assert!(series
            .bars()
            .iter()
            .all(|b| b.turnover.is_some_and(|t| t >= 20_000_000.0)));
    }
}
