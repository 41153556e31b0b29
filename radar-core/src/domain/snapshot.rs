//! Live snapshot: a partially formed current-session bar from a quote feed.

use super::calendar::TradingCalendar;
use super::instrument::InstrumentId;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Volume (and optionally turnover) the feed reports for a prior session, in
/// the feed's own units. Matched against stored bars to resolve unit scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub session: NaiveDate,
    pub volume: f64,
    #[serde(default)]
    pub turnover: Option<f64>,
}

/// Most recent quote state for one instrument.
///
/// Volumes and turnover are cumulative for the session and expressed in the
/// feed's units, which may differ from the Bar Store's (lots vs shares).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSnapshot {
    pub instrument: InstrumentId,
    pub as_of: NaiveDateTime,
    pub last_price: f64,
    pub cumulative_volume: f64,
    #[serde(default)]
    pub cumulative_turnover: Option<f64>,
    #[serde(default)]
    pub session_open: Option<f64>,
    #[serde(default)]
    pub session_high: Option<f64>,
    #[serde(default)]
    pub session_low: Option<f64>,
    #[serde(default)]
    pub reference_points: Vec<ReferencePoint>,
}

impl LiveSnapshot {
    pub fn new(
        instrument: InstrumentId,
        as_of: NaiveDateTime,
        last_price: f64,
        cumulative_volume: f64,
    ) -> Self {
        Self {
            instrument,
            as_of,
            last_price,
            cumulative_volume,
            cumulative_turnover: None,
            session_open: None,
            session_high: None,
            session_low: None,
            reference_points: Vec::new(),
        }
    }

    /// The session the snapshot belongs to. A quote taken on a weekend or
    /// holiday still describes the preceding session.
    pub fn session(&self, calendar: &TradingCalendar) -> NaiveDate {
        calendar.session_on_or_before(self.as_of.date())
    }

    /// Name of the first field that is not a usable number, if any.
    pub fn invalid_field(&self) -> Option<&'static str> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;

        if !positive(self.last_price) {
            return Some("last_price");
        }
        if !non_negative(self.cumulative_volume) {
            return Some("cumulative_volume");
        }
        if self.cumulative_turnover.is_some_and(|t| !non_negative(t)) {
            return Some("cumulative_turnover");
        }
        if self.session_open.is_some_and(|p| !positive(p)) {
            return Some("session_open");
        }
        if self.session_high.is_some_and(|p| !positive(p)) {
            return Some("session_high");
        }
        if self.session_low.is_some_and(|p| !positive(p)) {
            return Some("session_low");
        }
        if self.reference_points.iter().any(|r| {
            !non_negative(r.volume) || r.turnover.is_some_and(|t| !non_negative(t))
        }) {
            return Some("reference_points");
        }
        None
    }
}
