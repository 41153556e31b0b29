//! Sentinel: re-runs the scan pipeline per watchlist on a cadence and emits
//! alerts for signals that are new or have changed materially.
//!
//! Each watchlist keeps its own previous result, so a signal appearing in
//! one list never suppresses or triggers an alert in another. A tick for a
//! watchlist whose previous tick is still running is skipped. A tick whose
//! watchlist was removed (or re-added) while it ran is discarded, not
//! diffed. Cancellation is observed between ticks; a running tick always
//! finishes.

use crate::pipeline::{PipelineError, ScanPipeline};
use radar_core::domain::{DetectorKind, InstrumentId, PatternSignal};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WatchlistId(String);

impl WatchlistId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WatchlistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the sentinel reads the current watchlists from on every pass.
pub trait WatchlistSource: Send + Sync {
    fn watchlists(&self) -> BTreeMap<WatchlistId, BTreeSet<InstrumentId>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    New,
    Changed { previous_score: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub watchlist: WatchlistId,
    #[serde(flatten)]
    pub kind: AlertKind,
    pub signal: PatternSignal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Completed(Vec<Alert>),
    /// The previous tick for this watchlist was still running.
    Skipped,
    /// The watchlist was removed or replaced while the tick ran.
    Discarded,
}

/// Cooperative stop flag shared between the sentinel loop and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    const POLL: Duration = Duration::from_millis(50);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleep up to `duration`, waking early on cancel. Returns whether cancelled.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(Self::POLL.min(deadline - now));
        }
    }
}

#[derive(Debug)]
struct WatchState {
    previous: Option<Vec<PatternSignal>>,
    in_flight: bool,
    generation: u64,
}

/// Clears a watchlist's in-flight marker if its tick unwinds.
struct InFlight<'a> {
    states: &'a Mutex<HashMap<WatchlistId, WatchState>>,
    watchlist: &'a WatchlistId,
    generation: u64,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = states
            .get_mut(self.watchlist)
            .filter(|s| s.generation == self.generation)
        {
            state.in_flight = false;
        }
    }
}

pub struct Sentinel {
    pipeline: Arc<ScanPipeline>,
    cadence: Duration,
    materiality: f64,
    states: Mutex<HashMap<WatchlistId, WatchState>>,
    next_generation: AtomicU64,
}

impl Sentinel {
    pub fn new(pipeline: Arc<ScanPipeline>, cadence: Duration, materiality: f64) -> Self {
        Self {
            pipeline,
            cadence,
            materiality,
            states: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    /// One scan + diff for one watchlist.
    pub fn tick(
        &self,
        watchlist: &WatchlistId,
        instruments: &BTreeSet<InstrumentId>,
    ) -> Result<TickOutcome, PipelineError> {
        let generation = {
            let mut states = self.states.lock().unwrap();
            let state = states.entry(watchlist.clone()).or_insert_with(|| WatchState {
                previous: None,
                in_flight: false,
                generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            });
            if state.in_flight {
                debug!(%watchlist, "previous tick still running, skipping");
                return Ok(TickOutcome::Skipped);
            }
            state.in_flight = true;
            state.generation
        };

        let mut guard = InFlight {
            states: &self.states,
            watchlist,
            generation,
            armed: true,
        };
        let ids: Vec<InstrumentId> = instruments.iter().cloned().collect();
        let result = self.pipeline.run(&ids);

        let mut states = self.states.lock().unwrap();
        guard.armed = false;
        let Some(state) = states
            .get_mut(watchlist)
            .filter(|s| s.generation == generation)
        else {
            debug!(%watchlist, "watchlist changed during tick, discarding result");
            return Ok(TickOutcome::Discarded);
        };
        state.in_flight = false;

        let current = result?.signals;
        let alerts = diff(
            watchlist,
            state.previous.as_deref().unwrap_or_default(),
            &current,
            self.materiality,
        );
        state.previous = Some(current);
        Ok(TickOutcome::Completed(alerts))
    }

    /// Forget a watchlist. A tick for it that is still running is discarded.
    pub fn remove_watchlist(&self, watchlist: &WatchlistId) -> bool {
        self.states.lock().unwrap().remove(watchlist).is_some()
    }

    /// Tick every watchlist once; errors are logged and the list is skipped.
    pub fn run_once(&self, source: &dyn WatchlistSource) -> Vec<Alert> {
        let lists = source.watchlists();
        self.prune(&lists);
        let mut alerts = Vec::new();
        for (id, instruments) in &lists {
            if let Some(mut a) = self.tick_logged(id, instruments) {
                alerts.append(&mut a);
            }
        }
        alerts
    }

    /// Loop until cancelled, sending alerts as each watchlist completes.
    ///
    /// Passes start one cadence apart; a pass that overruns starts the next
    /// one immediately. Returns the number of completed passes.
    pub fn run(
        &self,
        source: &dyn WatchlistSource,
        alerts: &Sender<Alert>,
        cancel: &CancelToken,
    ) -> usize {
        let mut passes = 0;
        info!(cadence_secs = self.cadence.as_secs(), "sentinel started");
        'outer: while !cancel.is_cancelled() {
            let started = Instant::now();
            let lists = source.watchlists();
            self.prune(&lists);

            for (id, instruments) in &lists {
                if cancel.is_cancelled() {
                    break 'outer;
                }
                for alert in self.tick_logged(id, instruments).unwrap_or_default() {
                    if alerts.send(alert).is_err() {
                        info!("alert receiver closed, stopping sentinel");
                        break 'outer;
                    }
                }
            }
            passes += 1;

            let elapsed = started.elapsed();
            if elapsed > self.cadence {
                warn!(
                    elapsed_ms = elapsed.as_millis(),
                    cadence_ms = self.cadence.as_millis(),
                    "sentinel pass overran its cadence"
                );
            }
            if cancel.wait(self.cadence.saturating_sub(elapsed)) {
                break;
            }
        }
        info!(passes, "sentinel stopped");
        passes
    }

    fn tick_logged(
        &self,
        id: &WatchlistId,
        instruments: &BTreeSet<InstrumentId>,
    ) -> Option<Vec<Alert>> {
        match self.tick(id, instruments) {
            Ok(TickOutcome::Completed(alerts)) => {
                debug!(watchlist = %id, alerts = alerts.len(), "tick complete");
                Some(alerts)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(watchlist = %id, error = %e, "sentinel tick failed");
                None
            }
        }
    }

    fn prune(&self, lists: &BTreeMap<WatchlistId, BTreeSet<InstrumentId>>) {
        self.states
            .lock()
            .unwrap()
            .retain(|id, _| lists.contains_key(id));
    }
}

/// Alerts for signals in `current` that are absent from `previous`, or whose
/// score moved by at least `materiality`, or whose anchor or direction changed.
pub fn diff(
    watchlist: &WatchlistId,
    previous: &[PatternSignal],
    current: &[PatternSignal],
    materiality: f64,
) -> Vec<Alert> {
    let before: HashMap<(InstrumentId, DetectorKind), &PatternSignal> =
        previous.iter().map(|s| (s.key(), s)).collect();

    current
        .iter()
        .filter_map(|signal| {
            let kind = match before.get(&signal.key()) {
                None => AlertKind::New,
                Some(old) => {
                    let moved = (signal.score - old.score).abs() >= materiality - 1e-9;
                    if !(moved || signal.anchor != old.anchor || signal.direction != old.direction)
                    {
                        return None;
                    }
                    AlertKind::Changed {
                        previous_score: old.score,
                    }
                }
            };
            Some(Alert {
                watchlist: watchlist.clone(),
                kind,
                signal: signal.clone(),
            })
        })
        .collect()
}
