//! Bar fixtures shared by the runner's unit tests.

use chrono::{Duration, NaiveDate};
use radar_core::domain::{Bar, InstrumentId, Series};

pub fn bar_at(i: usize, open: f64, close: f64, volume: u64) -> Bar {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    Bar {
        timestamp: base + Duration::days(i as i64),
        open,
        high: open.max(close) * 1.005,
        low: open.min(close) * 0.995,
        close,
        volume,
        turnover: Some(50_000_000.0),
    }
}

pub fn bars_from_closes(closes: &[f64], volume: u64) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            bar_at(i, open, close, volume)
        })
        .collect()
}

fn ramp(path: &mut Vec<f64>, to: f64, steps: usize) {
    let from = *path.last().unwrap();
    for s in 1..=steps {
        path.push(from + (to - from) * s as f64 / steps as f64);
    }
}

/// Three contracting pullbacks (20%, 12%, 6%) without the breakout bar.
pub fn contractions() -> Vec<f64> {
    let mut path = vec![80.0];
    ramp(&mut path, 100.0, 40);
    ramp(&mut path, 80.0, 10);
    ramp(&mut path, 98.0, 10);
    ramp(&mut path, 86.24, 8);
    ramp(&mut path, 97.0, 8);
    ramp(&mut path, 91.18, 6);
    ramp(&mut path, 96.0, 4);
    path
}

/// The high-volume bar that completes `contractions()`.
pub fn breakout_bar() -> Bar {
    let closes = contractions();
    let prior = closes[closes.len() - 1];
    bar_at(closes.len(), prior, 99.0, 2500)
}

/// Steady uptrend with no reversals.
pub fn rising(n: usize) -> Vec<f64> {
    (0..n).map(|i| 50.0 + 0.3 * i as f64).collect()
}

pub fn instrument_series(symbol: &str, closes: Vec<f64>) -> Series {
    Series::new(InstrumentId::new("SH", symbol), bars_from_closes(&closes, 1000)).unwrap()
}
