//! AlphaRadar CLI: scan, sentinel, import and store commands.
//!
//! Commands:
//! - `scan`: one pass over a universe, watchlist or explicit instruments
//! - `sentinel`: re-scan watchlists on a cadence and print alerts as JSON lines
//! - `import`: load daily bars from CSV into the Parquet bar store
//! - `synth`: fill the store with deterministic synthetic bars (demo only)
//! - `store status`: per-instrument bar counts and date ranges

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand, ValueEnum};
use radar_core::domain::{Bar, InstrumentId};
use radar_core::live::{CircuitBreaker, HttpQuoteSource, QuoteSource};
use radar_core::scanner::ScanResult;
use radar_core::store::{BarStore, ParquetBarStore, StoreError};
use radar_runner::export::{export_json, export_signals_csv, save_artifacts};
use radar_runner::{
    synthetic_series, CancelToken, RadarConfig, ScanPipeline, Sentinel, Universe, WatchlistId,
    WatchlistSource, Watchlists,
};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "radar", about = "AlphaRadar: market-wide pattern scanner")]
struct Cli {
    /// Path to radar.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bar store directory; overrides `store.root` from the config.
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scan pass.
    Scan {
        /// Instruments as SYMBOL.EXCHANGE (e.g. 600519.SH).
        instruments: Vec<String>,

        /// Scan every listed instrument in this universe file.
        #[arg(long, conflicts_with = "watchlist")]
        universe: Option<PathBuf>,

        /// Scan one watchlist (requires --watchlists).
        #[arg(long, requires = "watchlists")]
        watchlist: Option<String>,

        /// Watchlist file.
        #[arg(long)]
        watchlists: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,

        /// Save manifest, JSON and CSV artifacts under this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Watch watchlists and print alerts.
    Sentinel {
        /// Watchlist file, re-read on every pass.
        #[arg(long)]
        watchlists: PathBuf,

        /// Run a single pass and exit.
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Import daily bars from CSV (date,open,high,low,close,volume[,turnover]).
    Import {
        file: PathBuf,

        /// Target instrument as SYMBOL.EXCHANGE.
        #[arg(long)]
        instrument: String,

        /// Replace stored history instead of appending newer bars.
        #[arg(long, default_value_t = false)]
        replace: bool,
    },
    /// Write synthetic bars for every instrument in a universe file.
    Synth {
        #[arg(long)]
        universe: PathBuf,

        /// First session (YYYY-MM-DD).
        #[arg(long, default_value = "2023-01-03")]
        start: String,

        #[arg(long, default_value_t = 250)]
        sessions: usize,
    },
    /// Bar store management commands.
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Report bar counts and date ranges per instrument.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RadarConfig::from_file(path)?,
        None => RadarConfig::default(),
    };
    if let Some(dir) = cli.store_dir {
        config.store.root = dir;
    }

    match cli.command {
        Commands::Scan {
            instruments,
            universe,
            watchlist,
            watchlists,
            format,
            output_dir,
        } => run_scan(
            &config,
            instruments,
            universe,
            watchlist,
            watchlists,
            format,
            output_dir,
        ),
        Commands::Sentinel { watchlists, once } => run_sentinel(&config, &watchlists, once),
        Commands::Import {
            file,
            instrument,
            replace,
        } => run_import(&config, &file, &instrument, replace),
        Commands::Synth {
            universe,
            start,
            sessions,
        } => run_synth(&config, &universe, &start, sessions),
        Commands::Store { action } => match action {
            StoreAction::Status => run_store_status(&config),
        },
    }
}

fn build_pipeline(config: &RadarConfig) -> Result<ScanPipeline> {
    let store: Arc<dyn BarStore> = Arc::new(ParquetBarStore::new(&config.store.root));
    let quotes: Option<Arc<dyn QuoteSource>> = match &config.quotes.base_url {
        Some(url) => {
            let breaker = Arc::new(CircuitBreaker::new(
                Duration::from_secs(config.quotes.breaker_cooldown_secs),
                config.quotes.breaker_failures,
            ));
            let source = HttpQuoteSource::new(
                url.clone(),
                Duration::from_secs(config.quotes.timeout_secs),
                breaker,
            )?;
            Some(Arc::new(source) as Arc<dyn QuoteSource>)
        }
        None => None,
    };
    Ok(ScanPipeline::from_config(config, store, quotes)?)
}

fn parse_ids(raw: &[String]) -> Result<Vec<InstrumentId>> {
    raw.iter()
        .map(|s| s.parse::<InstrumentId>().with_context(|| format!("bad instrument '{s}'")))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn run_scan(
    config: &RadarConfig,
    instruments: Vec<String>,
    universe: Option<PathBuf>,
    watchlist: Option<String>,
    watchlists: Option<PathBuf>,
    format: OutputFormat,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let universe = universe.map(|path| Universe::from_file(&path)).transpose()?;
    let ids = match (&universe, watchlist) {
        (Some(universe), _) => universe.tradable_ids(),
        (None, Some(name)) => {
            let path = watchlists.context("--watchlist requires --watchlists")?;
            let lists = Watchlists::from_file(&path)?;
            match lists.get(&WatchlistId::new(name.clone())) {
                Some(members) => members.iter().cloned().collect(),
                None => bail!("watchlist '{name}' not found in {}", path.display()),
            }
        }
        (None, None) => parse_ids(&instruments)?,
    };
    if ids.is_empty() {
        bail!("nothing to scan: pass instruments, --universe or --watchlist");
    }

    let mut pipeline = build_pipeline(config)?;
    if let Some(universe) = &universe {
        pipeline = pipeline.with_universe(universe);
    }
    let result = pipeline.run(&ids)?;

    match format {
        OutputFormat::Table => print_table(&result),
        OutputFormat::Csv => print!("{}", export_signals_csv(&result)?),
        OutputFormat::Json => println!("{}", export_json(&result)?),
    }

    if let Some(dir) = output_dir {
        let run_dir = save_artifacts(&result, config, &dir)?;
        eprintln!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn print_table(result: &ScanResult) {
    println!(
        "Scanned {} instruments: {} signals, {} skipped, {} degraded",
        result.instruments_scanned,
        result.len(),
        result.skipped_count(),
        result.degraded_count()
    );
    if result.is_empty() {
        return;
    }
    println!();
    println!(
        "{:>4}  {:<12} {:<14} {:<8} {:>6}  {:<20} {:>10}",
        "Rank", "Instrument", "Detector", "Dir", "Score", "Anchor", "Level"
    );
    println!("{}", "-".repeat(82));
    for (i, s) in result.signals.iter().enumerate() {
        let dir = format!("{:?}", s.direction).to_lowercase();
        let level = s
            .evidence
            .level
            .map(|l| format!("{l:.2}"))
            .unwrap_or_else(|| "-".into());
        let marker = if s.provisional { "*" } else { "" };
        println!(
            "{:>4}  {:<12} {:<14} {:<8} {:>6.3}  {:<20} {:>10}",
            i + 1,
            s.instrument.to_string(),
            s.detector.as_str(),
            dir,
            s.score,
            format!("{}{marker}", s.anchor.format("%Y-%m-%d")),
            level
        );
    }
    if !result.diagnostics.is_empty() {
        println!();
        for d in &result.diagnostics {
            println!(
                "  {:<12} {:<22} {}",
                d.instrument.to_string(),
                d.kind.to_string(),
                d.message
            );
        }
    }
}

/// Watchlist file re-read on every pass, so edits apply without a restart.
struct WatchlistFile {
    path: PathBuf,
}

impl WatchlistSource for WatchlistFile {
    fn watchlists(
        &self,
    ) -> std::collections::BTreeMap<WatchlistId, std::collections::BTreeSet<InstrumentId>> {
        match Watchlists::from_file(&self.path) {
            Ok(lists) => lists.watchlists(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read watchlists");
                Default::default()
            }
        }
    }
}

fn run_sentinel(config: &RadarConfig, watchlists: &Path, once: bool) -> Result<()> {
    // Fail fast on a broken file before entering the loop.
    Watchlists::from_file(watchlists)?;
    let source = WatchlistFile {
        path: watchlists.to_path_buf(),
    };
    let sentinel = Sentinel::new(
        Arc::new(build_pipeline(config)?),
        config.sentinel.cadence(),
        config.sentinel.materiality,
    );

    if once {
        for alert in sentinel.run_once(&source) {
            println!("{}", serde_json::to_string(&alert)?);
        }
        return Ok(());
    }

    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let passes = std::thread::scope(|s| {
        let (sentinel, source, worker_cancel) = (&sentinel, &source, &cancel);
        // The sender moves into the worker, so `rx` drains once it stops.
        let worker = s.spawn(move || sentinel.run(source, &tx, worker_cancel));
        let mut out = std::io::stdout().lock();
        for alert in rx.iter() {
            let written = serde_json::to_string(&alert)
                .map_err(anyhow::Error::from)
                .and_then(|json| writeln!(out, "{json}").map_err(anyhow::Error::from));
            if let Err(e) = written {
                warn!(error = %e, "cannot write alerts, stopping sentinel");
                cancel.cancel();
                break;
            }
        }
        worker.join()
    })
    .map_err(|_| anyhow::anyhow!("sentinel thread panicked"))?;
    info!(passes, "sentinel exited");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    turnover: Option<f64>,
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y%m%d"))
        .with_context(|| format!("bad date '{raw}'"))?;
    date.and_hms_opt(15, 0, 0)
        .with_context(|| format!("bad date '{raw}'"))
}

fn read_csv_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut bars = Vec::new();
    for (line, row) in reader.deserialize::<CsvBar>().enumerate() {
        let row = row.with_context(|| format!("bad CSV row {}", line + 2))?;
        if !(row.volume.is_finite() && row.volume >= 0.0) {
            bail!("bad volume on CSV row {}", line + 2);
        }
        bars.push(Bar {
            timestamp: parse_timestamp(&row.date)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.round() as u64,
            turnover: row.turnover,
        });
    }
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

fn run_import(config: &RadarConfig, file: &Path, instrument: &str, replace: bool) -> Result<()> {
    let id: InstrumentId = instrument
        .parse()
        .with_context(|| format!("bad instrument '{instrument}'"))?;
    let bars = read_csv_bars(file)?;
    let store = ParquetBarStore::new(&config.store.root);

    if replace {
        let series = radar_core::domain::Series::new(id.clone(), bars)?;
        store.write_series(&series)?;
        println!("{id}: wrote {} bars", series.len());
        return Ok(());
    }

    let last = match store.get_history(&id, None, None) {
        Ok(series) => series.last().map(|b| b.timestamp),
        Err(StoreError::NotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    let (mut appended, mut skipped) = (0usize, 0usize);
    for bar in bars {
        if last.is_some_and(|l| bar.timestamp <= l) {
            skipped += 1;
            continue;
        }
        store.append_bar(&id, bar)?;
        appended += 1;
    }
    println!("{id}: appended {appended} bars, skipped {skipped} already stored");
    Ok(())
}

fn run_synth(config: &RadarConfig, universe: &Path, start: &str, sessions: usize) -> Result<()> {
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")?;
    let universe = Universe::from_file(universe)?;
    let store = ParquetBarStore::new(&config.store.root);
    for inst in universe.instruments() {
        let series = synthetic_series(&inst.id, start, sessions, &config.merge.calendar)?;
        store.write_series(&series)?;
    }
    println!(
        "Wrote {sessions} synthetic sessions for {} instruments to {}",
        universe.len(),
        config.store.root.display()
    );
    Ok(())
}

fn run_store_status(config: &RadarConfig) -> Result<()> {
    let root = &config.store.root;
    if !root.exists() {
        println!("Store directory does not exist: {}", root.display());
        return Ok(());
    }
    let rows = ParquetBarStore::new(root).status()?;
    if rows.is_empty() {
        println!("Store is empty: {}", root.display());
        return Ok(());
    }

    println!("Store: {}", root.display());
    println!("Instruments: {}", rows.len());
    println!();
    println!("{:<12} {:>8}  {:<12} {:<12}", "Instrument", "Bars", "First", "Last");
    println!("{}", "-".repeat(48));
    let day = |t: Option<NaiveDateTime>| {
        t.map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".into())
    };
    for row in &rows {
        println!(
            "{:<12} {:>8}  {:<12} {:<12}",
            row.instrument.to_string(),
            row.bar_count,
            day(row.first),
            day(row.last)
        );
    }
    Ok(())
}
