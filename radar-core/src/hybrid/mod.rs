//! Hybrid Data Engine: stored history + live snapshot → one unified series.
//!
//! `merge` is pure: no I/O, no clock. It decides where the snapshot sits
//! relative to the last stored session, resolves the feed's volume and
//! turnover units against the store's, and builds at most one trailing
//! open bar. Stored bars are never modified.

pub mod scale;

pub use scale::{resolve_ratio, LowConfidence, ScalePolicy, ScaleResolution};

use crate::domain::{Bar, InstrumentId, LiveSnapshot, Series, TradingCalendar};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignmentError {
    #[error("snapshot is for {snapshot}, history is for {history}")]
    InstrumentMismatch {
        history: InstrumentId,
        snapshot: InstrumentId,
    },

    #[error("snapshot field '{field}' is not a usable number")]
    InvalidSnapshot { field: &'static str },

    #[error("scale ratio {ratio} is not a finite positive number")]
    UnresolvableScale { ratio: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("alignment failed: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("stale snapshot: {as_of} is {sessions} sessions before last stored bar {last}")]
    StaleSnapshot {
        as_of: NaiveDateTime,
        last: NaiveDateTime,
        sessions: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub calendar: TradingCalendar,
    pub scale: ScalePolicy,
    /// A snapshot this many sessions behind the last stored bar is ignored
    /// with a warning; further behind is a `StaleSnapshot` error.
    pub max_snapshot_lag: i64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            calendar: TradingCalendar::default(),
            scale: ScalePolicy::default(),
            max_snapshot_lag: 1,
        }
    }
}

/// Non-fatal conditions attached to a merge result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum MergeWarning {
    /// Volume or turnover scale could not be resolved with confidence.
    LowConfidenceScale {
        field: ScaleField,
        ratio: f64,
        detail: LowConfidence,
    },
    /// The snapshot is older than the stored data and was not applied.
    SupersededSnapshot { as_of: NaiveDateTime },
    /// Sessions are missing between the last stored bar and the snapshot.
    SessionGap { missing_sessions: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleField {
    Volume,
    Turnover,
}

/// History with at most one trailing open bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSeries {
    instrument: InstrumentId,
    bars: Vec<Bar>,
    open_last: bool,
    pub warnings: Vec<MergeWarning>,
    pub volume_scale: Option<ScaleResolution>,
    pub turnover_scale: Option<ScaleResolution>,
}

impl UnifiedSeries {
    /// History only; no open bar.
    pub fn from_history(history: Series) -> Self {
        let instrument = history.instrument().clone();
        Self {
            instrument,
            bars: history.into_bars(),
            open_last: false,
            warnings: Vec::new(),
            volume_scale: None,
            turnover_scale: None,
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Whether the last bar is an incomplete live bar.
    pub fn has_open_bar(&self) -> bool {
        self.open_last
    }

    pub fn open_bar(&self) -> Option<&Bar> {
        if self.open_last {
            self.bars.last()
        } else {
            None
        }
    }

    /// The completed bars, excluding any open bar.
    pub fn closed_bars(&self) -> &[Bar] {
        if self.open_last {
            &self.bars[..self.bars.len() - 1]
        } else {
            &self.bars
        }
    }
}

/// Where the snapshot's session falls relative to the last stored bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Same session: replace the last bar with an updated open bar.
    Update,
    /// A later session (or no history): append an open bar.
    Append { missing_sessions: i64 },
    /// Older but within the allowed lag: ignore.
    Superseded,
}

/// Merge stored history with an optional live snapshot.
pub fn merge(
    history: &Series,
    live: Option<&LiveSnapshot>,
    config: &MergeConfig,
) -> Result<UnifiedSeries, MergeError> {
    let Some(snapshot) = live else {
        return Ok(UnifiedSeries::from_history(history.clone()));
    };

    if snapshot.instrument != *history.instrument() {
        return Err(AlignmentError::InstrumentMismatch {
            history: history.instrument().clone(),
            snapshot: snapshot.instrument.clone(),
        }
        .into());
    }
    if let Some(field) = snapshot.invalid_field() {
        return Err(AlignmentError::InvalidSnapshot { field }.into());
    }

    let session = snapshot.session(&config.calendar);
    let placement = place(history, snapshot, session, config)?;
    let mut unified = UnifiedSeries::from_history(history.clone());

    if placement == Placement::Superseded {
        unified.warnings.push(MergeWarning::SupersededSnapshot {
            as_of: snapshot.as_of,
        });
        return Ok(unified);
    }

    let volume_scale = resolve_ratio(
        &volume_pairs(history, snapshot),
        config.scale.default_volume_ratio,
        &config.scale,
    )?;
    let turnover_scale = match snapshot.cumulative_turnover {
        Some(_) => Some(resolve_ratio(
            &turnover_pairs(history, snapshot),
            config.scale.default_turnover_ratio,
            &config.scale,
        )?),
        None => None,
    };

    let volume = scaled_volume(snapshot.cumulative_volume, volume_scale.ratio)?;
    let turnover = match (&turnover_scale, snapshot.cumulative_turnover) {
        (Some(scale), Some(t)) => Some(t * scale.ratio),
        _ => None,
    };

    if let Placement::Append { missing_sessions } = placement {
        if missing_sessions > 0 {
            unified
                .warnings
                .push(MergeWarning::SessionGap { missing_sessions });
        }
        let bar = open_bar(history.last(), snapshot, session, volume, turnover);
        unified.bars.push(bar);
    } else if let Some(stored) = unified.bars.last() {
        if volume < stored.volume {
            // The store already holds a later state of this session.
            unified.warnings.push(MergeWarning::SupersededSnapshot {
                as_of: snapshot.as_of,
            });
            return Ok(unified);
        }
        let updated = updated_bar(stored, snapshot, volume, turnover);
        let last = unified.bars.len() - 1;
        unified.bars[last] = updated;
    }

    if let Some(detail) = volume_scale.low_confidence.clone() {
        unified.warnings.push(MergeWarning::LowConfidenceScale {
            field: ScaleField::Volume,
            ratio: volume_scale.ratio,
            detail,
        });
    }
    if let Some(scale) = &turnover_scale {
        if let Some(detail) = scale.low_confidence.clone() {
            unified.warnings.push(MergeWarning::LowConfidenceScale {
                field: ScaleField::Turnover,
                ratio: scale.ratio,
                detail,
            });
        }
    }

    unified.open_last = true;
    unified.volume_scale = Some(volume_scale);
    unified.turnover_scale = turnover_scale;
    Ok(unified)
}

fn place(
    history: &Series,
    snapshot: &LiveSnapshot,
    session: NaiveDate,
    config: &MergeConfig,
) -> Result<Placement, MergeError> {
    let Some(last) = history.last() else {
        return Ok(Placement::Append {
            missing_sessions: 0,
        });
    };
    let sessions = config
        .calendar
        .sessions_between(last.session(), session);
    match sessions {
        0 => Ok(Placement::Update),
        s if s > 0 => Ok(Placement::Append {
            missing_sessions: s - 1,
        }),
        s if -s <= config.max_snapshot_lag => Ok(Placement::Superseded),
        s => Err(MergeError::StaleSnapshot {
            as_of: snapshot.as_of,
            last: last.timestamp,
            sessions: -s,
        }),
    }
}

fn stored_on(history: &Series, session: NaiveDate) -> Option<&Bar> {
    history
        .bars()
        .binary_search_by_key(&session, |b| b.session())
        .ok()
        .map(|i| &history.bars()[i])
}

fn volume_pairs(history: &Series, snapshot: &LiveSnapshot) -> Vec<(f64, f64)> {
    snapshot
        .reference_points
        .iter()
        .filter_map(|r| stored_on(history, r.session).map(|b| (b.volume as f64, r.volume)))
        .collect()
}

fn turnover_pairs(history: &Series, snapshot: &LiveSnapshot) -> Vec<(f64, f64)> {
    snapshot
        .reference_points
        .iter()
        .filter_map(|r| {
            let stored = stored_on(history, r.session)?.turnover?;
            Some((stored, r.turnover?))
        })
        .collect()
}

fn scaled_volume(cumulative: f64, ratio: f64) -> Result<u64, AlignmentError> {
    let v = (cumulative * ratio).round();
    if !v.is_finite() || v < 0.0 || v > u64::MAX as f64 {
        return Err(AlignmentError::UnresolvableScale { ratio });
    }
    Ok(v as u64)
}

/// Open bar for a new session, dated on `session`.
///
/// Open is the session's first trade when the feed has it, else the prior
/// close, else the last price. High/low are the feed's running extrema,
/// widened to cover open and last.
fn open_bar(
    prior: Option<&Bar>,
    snap: &LiveSnapshot,
    session: NaiveDate,
    volume: u64,
    turnover: Option<f64>,
) -> Bar {
    let open = snap
        .session_open
        .or(prior.map(|b| b.close))
        .unwrap_or(snap.last_price);
    let high = snap
        .session_high
        .unwrap_or(snap.last_price)
        .max(open)
        .max(snap.last_price);
    let low = snap
        .session_low
        .unwrap_or(snap.last_price)
        .min(open)
        .min(snap.last_price);
    // Daily stores stamp bars with a fixed time of day; keep it.
    let time = prior.map_or(snap.as_of.time(), |b| b.timestamp.time());
    let timestamp = session.and_time(time);
    Bar {
        timestamp,
        open,
        high,
        low,
        close: snap.last_price,
        volume,
        turnover,
    }
}

/// The stored bar for the snapshot's session, brought up to date.
fn updated_bar(stored: &Bar, snap: &LiveSnapshot, volume: u64, turnover: Option<f64>) -> Bar {
    let high = snap
        .session_high
        .unwrap_or(snap.last_price)
        .max(stored.high)
        .max(snap.last_price);
    let low = snap
        .session_low
        .unwrap_or(snap.last_price)
        .min(stored.low)
        .min(snap.last_price);
    Bar {
        timestamp: stored.timestamp,
        open: stored.open,
        high,
        low,
        close: snap.last_price,
        volume,
        turnover: turnover.or(stored.turnover),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReferencePoint;

    fn ts(m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn id() -> InstrumentId {
        InstrumentId::new("SH", "600519")
    }

    fn bar(m: u32, d: u32, close: f64, volume: u64) -> Bar {
        Bar {
            timestamp: ts(m, d),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
            turnover: Some(close * volume as f64),
        }
    }

    /// Tue 2 Jan .. Fri 5 Jan 2024.
    fn history() -> Series {
        Series::new(
            id(),
            vec![
                bar(1, 2, 10.0, 1_000_000),
                bar(1, 3, 10.5, 1_200_000),
                bar(1, 4, 10.8, 900_000),
                bar(1, 5, 11.0, 1_100_000),
            ],
        )
        .unwrap()
    }

    fn snapshot_at(as_of: NaiveDateTime, last: f64, cum_volume: f64) -> LiveSnapshot {
        LiveSnapshot::new(id(), as_of, last, cum_volume)
    }

    fn monday_morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 8)
            .unwrap()
            .and_hms_opt(10, 15, 0)
            .unwrap()
    }

    #[test]
    fn absent_snapshot_returns_history() {
        let h = history();
        let u = merge(&h, None, &MergeConfig::default()).unwrap();
        assert_eq!(u.bars(), h.bars());
        assert!(!u.has_open_bar());
        assert!(u.warnings.is_empty());
    }

    #[test]
    fn next_session_appends_one_open_bar() {
        let h = history();
        let mut snap = snapshot_at(monday_morning(), 11.4, 50_000.0);
        snap.reference_points.push(ReferencePoint {
            session: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            volume: 110_000.0,
            turnover: None,
        });

        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();
        assert_eq!(u.len(), h.len() + 1);
        assert_eq!(&u.bars()[..h.len()], h.bars());
        assert!(u.has_open_bar());

        let open = u.open_bar().unwrap();
        assert_eq!(open.timestamp, ts(1, 8));
        assert_eq!(open.open, 11.0); // prior close
        assert_eq!(open.close, 11.4);
        assert_eq!(open.high, 11.4);
        assert_eq!(open.low, 11.0);
        assert_eq!(open.volume, 500_000); // ratio 10
        assert_eq!(u.volume_scale.as_ref().unwrap().ratio, 10.0);
        assert!(u.warnings.is_empty());
    }

    #[test]
    fn no_overlap_falls_back_to_default_ratio() {
        let h = history();
        let snap = snapshot_at(monday_morning(), 11.2, 3_000.0);
        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();
        assert_eq!(u.open_bar().unwrap().volume, 300_000);
        assert!(u.warnings.iter().any(|w| matches!(
            w,
            MergeWarning::LowConfidenceScale {
                field: ScaleField::Volume,
                detail: LowConfidence::NoOverlap,
                ..
            }
        )));
    }

    #[test]
    fn same_session_updates_in_place() {
        let h = history();
        let mut snap = snapshot_at(
            NaiveDate::from_ymd_opt(2024, 1, 5)
                .unwrap()
                .and_hms_opt(14, 0, 0)
                .unwrap(),
            12.5,
            12_000.0,
        );
        snap.session_high = Some(12.6);
        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();

        assert_eq!(u.len(), h.len());
        assert_eq!(&u.bars()[..3], &h.bars()[..3]);
        let last = u.open_bar().unwrap();
        assert_eq!(last.timestamp, ts(1, 5));
        assert_eq!(last.open, 11.0);
        assert_eq!(last.high, 12.6);
        assert_eq!(last.low, 10.0);
        assert_eq!(last.close, 12.5);
        assert_eq!(last.volume, 1_200_000);
    }

    #[test]
    fn same_session_with_less_volume_is_superseded() {
        let h = history();
        let snap = snapshot_at(
            NaiveDate::from_ymd_opt(2024, 1, 5)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            10.9,
            100.0,
        );
        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();
        assert_eq!(u.bars(), h.bars());
        assert!(!u.has_open_bar());
        assert!(matches!(
            u.warnings[0],
            MergeWarning::SupersededSnapshot { .. }
        ));
    }

    #[test]
    fn one_session_old_snapshot_is_ignored() {
        let h = history();
        let snap = snapshot_at(ts(1, 4), 10.8, 9_000.0);
        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();
        assert_eq!(u.bars(), h.bars());
        assert!(!u.has_open_bar());
    }

    #[test]
    fn older_snapshot_is_stale() {
        let h = history();
        let snap = snapshot_at(ts(1, 3), 10.5, 9_000.0);
        let err = merge(&h, Some(&snap), &MergeConfig::default()).unwrap_err();
        assert!(matches!(err, MergeError::StaleSnapshot { sessions: 2, .. }));
    }

    #[test]
    fn skipped_sessions_warn() {
        let h = history();
        let snap = snapshot_at(
            NaiveDate::from_ymd_opt(2024, 1, 10)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            11.0,
            1_000.0,
        );
        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();
        assert!(u.warnings.contains(&MergeWarning::SessionGap {
            missing_sessions: 2
        }));
    }

    #[test]
    fn mismatched_instrument_is_alignment_error() {
        let h = history();
        let mut snap = snapshot_at(monday_morning(), 11.0, 1_000.0);
        snap.instrument = InstrumentId::new("SZ", "000001");
        let err = merge(&h, Some(&snap), &MergeConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            MergeError::Alignment(AlignmentError::InstrumentMismatch { .. })
        ));
    }

    #[test]
    fn invalid_snapshot_is_alignment_error() {
        let h = history();
        let snap = snapshot_at(monday_morning(), f64::NAN, 1_000.0);
        let err = merge(&h, Some(&snap), &MergeConfig::default()).unwrap_err();
        assert_eq!(
            err,
            MergeError::Alignment(AlignmentError::InvalidSnapshot {
                field: "last_price"
            })
        );
    }

    #[test]
    fn turnover_scale_resolved_from_references() {
        let h = history();
        let mut snap = snapshot_at(monday_morning(), 11.4, 50_000.0);
        snap.cumulative_turnover = Some(570.0);
        snap.reference_points.push(ReferencePoint {
            session: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            volume: 110_000.0,
            turnover: Some(12_100.0), // stored 12_100_000 → thousands
        });
        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();
        assert_eq!(u.turnover_scale.as_ref().unwrap().ratio, 1000.0);
        assert_eq!(u.open_bar().unwrap().turnover, Some(570_000.0));
    }

    #[test]
    fn empty_history_appends_from_snapshot() {
        let h = Series::empty(id());
        let mut snap = snapshot_at(monday_morning(), 11.0, 10.0);
        snap.session_open = Some(10.5);
        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();
        assert_eq!(u.len(), 1);
        let open = u.open_bar().unwrap();
        assert_eq!(open.open, 10.5);
        assert!(open.is_sane());
    }

    #[test]
    fn weekend_snapshot_opens_the_pending_session() {
        // Stored through Thursday; Saturday's quote describes Friday.
        let h = Series::new(id(), history().into_bars()[..3].to_vec()).unwrap();
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let config = MergeConfig::default();
        let snap = snapshot_at(saturday, 11.1, 9_000.0);
        let u = merge(&h, Some(&snap), &config).unwrap();

        let open = u.open_bar().unwrap();
        assert_eq!(open.timestamp, ts(1, 5));
        assert!(config.calendar.is_session(open.session()));
        assert!(!u
            .warnings
            .iter()
            .any(|w| matches!(w, MergeWarning::SessionGap { .. })));
    }

    #[test]
    fn weekend_snapshot_after_friday_updates_friday() {
        let h = history();
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();
        let snap = snapshot_at(sunday, 11.2, 12_000.0);
        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();
        assert_eq!(u.len(), h.len());
        assert_eq!(u.open_bar().unwrap().timestamp, ts(1, 5));
        assert_eq!(u.open_bar().unwrap().close, 11.2);
    }

    #[test]
    fn closed_bars_excludes_open_bar() {
        let h = history();
        let snap = snapshot_at(monday_morning(), 11.4, 5_000.0);
        let u = merge(&h, Some(&snap), &MergeConfig::default()).unwrap();
        assert_eq!(u.closed_bars(), h.bars());
    }
}
