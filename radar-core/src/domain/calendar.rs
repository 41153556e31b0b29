//! Trading calendar: session arithmetic over weekdays minus exchange holidays.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Weekday sessions, minus an explicit holiday list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingCalendar {
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn is_session(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Signed number of sessions from `from` to `to`.
    ///
    /// Counts sessions in `(from, to]` when `to > from`, and the negated count
    /// of sessions in `(to, from]` when `to < from`. Zero means both dates fall
    /// in the same session (a weekend date maps onto the preceding session).
    pub fn sessions_between(&self, from: NaiveDate, to: NaiveDate) -> i64 {
        if to == from {
            return 0;
        }
        let (lo, hi, sign) = if to > from { (from, to, 1) } else { (to, from, -1) };
        let mut count = 0;
        let mut day = lo + Duration::days(1);
        while day <= hi {
            if self.is_session(day) {
                count += 1;
            }
            day += Duration::days(1);
        }
        sign * count
    }

    /// The first session strictly after `date`.
    pub fn next_session(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date + Duration::days(1);
        while !self.is_session(day) {
            day += Duration::days(1);
        }
        day
    }

    /// The last session at or before `date`.
    pub fn session_on_or_before(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        while !self.is_session(day) {
            day -= Duration::days(1);
        }
        day
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekends_are_not_sessions() {
        let cal = TradingCalendar::default();
        assert!(cal.is_session(d(2024, 1, 5))); // Friday
        assert!(!cal.is_session(d(2024, 1, 6)));
        assert!(!cal.is_session(d(2024, 1, 7)));
    }

    #[test]
    fn friday_to_monday_is_one_session() {
        let cal = TradingCalendar::default();
        assert_eq!(cal.sessions_between(d(2024, 1, 5), d(2024, 1, 8)), 1);
        assert_eq!(cal.sessions_between(d(2024, 1, 8), d(2024, 1, 5)), -1);
    }

    #[test]
    fn weekend_snapshot_maps_to_friday_session() {
        let cal = TradingCalendar::default();
        assert_eq!(cal.sessions_between(d(2024, 1, 5), d(2024, 1, 6)), 0);
        assert_eq!(cal.session_on_or_before(d(2024, 1, 7)), d(2024, 1, 5));
    }

    #[test]
    fn holidays_are_skipped() {
        let cal = TradingCalendar::new([d(2024, 1, 1)]);
        assert!(!cal.is_session(d(2024, 1, 1)));
        assert_eq!(cal.next_session(d(2023, 12, 29)), d(2024, 1, 2));
        assert_eq!(cal.sessions_between(d(2023, 12, 29), d(2024, 1, 2)), 1);
    }
}
