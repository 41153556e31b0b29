//! Scan result export: CSV signal table, full JSON, and saved artifacts.
//!
//! Saved artifacts are named by the result fingerprint, so two identical
//! passes write to the same directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use radar_core::scanner::ScanResult;
use serde::{Deserialize, Serialize};

use crate::config::RadarConfig;

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `ScanResult` to pretty JSON.
pub fn export_json(result: &ScanResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize ScanResult to JSON")
}

pub fn import_json(json: &str) -> Result<ScanResult> {
    serde_json::from_str(json).context("failed to deserialize ScanResult from JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

/// One row per signal, in ranked order.
///
/// Columns: rank, instrument, detector, direction, score, anchor,
/// provisional, level, pivots, metrics
pub fn export_signals_csv(result: &ScanResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "rank",
        "instrument",
        "detector",
        "direction",
        "score",
        "anchor",
        "provisional",
        "level",
        "pivots",
        "metrics",
    ])?;

    for (i, s) in result.signals.iter().enumerate() {
        let pivots = s
            .evidence
            .pivots
            .iter()
            .map(|p| p.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>()
            .join(" ");
        let metrics = s
            .evidence
            .metrics
            .iter()
            .map(|(k, v)| format!("{k}={v:.4}"))
            .collect::<Vec<_>>()
            .join(" ");
        wtr.write_record([
            &(i + 1).to_string(),
            &s.instrument.to_string(),
            s.detector.as_str(),
            &format!("{:?}", s.direction).to_lowercase(),
            &format!("{:.4}", s.score),
            &s.anchor.to_string(),
            &s.provisional.to_string(),
            &s.evidence.level.map(|l| format!("{l:.4}")).unwrap_or_default(),
            &pivots,
            &metrics,
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per skipped or degraded instrument.
pub fn export_diagnostics_csv(result: &ScanResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["instrument", "severity", "kind", "message"])?;
    for d in &result.diagnostics {
        wtr.write_record([
            &d.instrument.to_string(),
            &format!("{:?}", d.severity).to_lowercase(),
            &d.kind.to_string(),
            &d.message,
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub fingerprint: String,
    pub config_hash: String,
    pub generated_at: chrono::NaiveDateTime,
    pub instruments_scanned: usize,
    pub signals: usize,
    pub skipped: usize,
    pub degraded: usize,
}

/// Save `scan_{fingerprint[..12]}/` under `output_dir` containing:
/// - `manifest.json`: counts, fingerprint and config hash
/// - `result.json`: the full `ScanResult`
/// - `signals.csv` and `diagnostics.csv`
pub fn save_artifacts(
    result: &ScanResult,
    config: &RadarConfig,
    output_dir: &Path,
) -> Result<PathBuf> {
    let fingerprint = result.fingerprint();
    let run_dir = output_dir.join(format!("scan_{}", &fingerprint[..12]));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let manifest = Manifest {
        fingerprint,
        config_hash: config.hash(),
        generated_at: chrono::Local::now().naive_local(),
        instruments_scanned: result.instruments_scanned,
        signals: result.len(),
        skipped: result.skipped_count(),
        degraded: result.degraded_count(),
    };
    let manifest_json =
        serde_json::to_string_pretty(&manifest).context("failed to serialize manifest")?;
    std::fs::write(run_dir.join("manifest.json"), manifest_json)?;
    std::fs::write(run_dir.join("result.json"), export_json(result)?)?;
    std::fs::write(run_dir.join("signals.csv"), export_signals_csv(result)?)?;
    std::fs::write(run_dir.join("diagnostics.csv"), export_diagnostics_csv(result)?)?;

    Ok(run_dir)
}

pub fn load_artifacts(dir: &Path) -> Result<ScanResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
