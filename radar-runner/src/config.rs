//! Radar configuration file (`radar.toml`).
//!
//! Every section is optional; missing fields take the documented defaults.
//!
//! ```toml
//! [store]
//! root = "data"
//!
//! [scan]
//! min_confidence = 0.65
//! detectors = ["vcp", "double_bottom"]
//!
//! [sentinel]
//! cadence_secs = 300
//! ```

use radar_core::hybrid::MergeConfig;
use radar_core::indicators::IndicatorParams;
use radar_core::scanner::ScanConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory of the Parquet bar store.
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Most recent bars loaded per instrument for a scan.
    pub max_bars: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_bars: 250 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    pub cadence_secs: u64,
    /// Smallest score change on an existing signal that raises an alert.
    pub materiality: f64,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            cadence_secs: 300,
            materiality: 0.10,
        }
    }
}

impl SentinelConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteConfig {
    /// JSON snapshot endpoint; no live data when unset.
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub breaker_cooldown_secs: u64,
    pub breaker_failures: u32,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 5,
            breaker_cooldown_secs: 600,
            breaker_failures: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub store: StoreConfig,
    pub history: HistoryConfig,
    pub merge: MergeConfig,
    pub indicators: IndicatorParams,
    pub scan: ScanConfig,
    pub sentinel: SentinelConfig,
    pub quotes: QuoteConfig,
}

impl RadarConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.indicators
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !(0.0..=1.0).contains(&self.scan.min_confidence) {
            return Err(ConfigError::Invalid(format!(
                "scan.min_confidence must be within [0, 1], got {}",
                self.scan.min_confidence
            )));
        }
        if !(self.scan.min_avg_turnover.is_finite() && self.scan.min_avg_turnover >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "scan.min_avg_turnover must be >= 0, got {}",
                self.scan.min_avg_turnover
            )));
        }
        if self.history.max_bars == 0 {
            return Err(ConfigError::Invalid("history.max_bars must be > 0".into()));
        }
        if self.sentinel.cadence_secs == 0 {
            return Err(ConfigError::Invalid("sentinel.cadence_secs must be > 0".into()));
        }
        if !(self.sentinel.materiality.is_finite() && self.sentinel.materiality >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sentinel.materiality must be >= 0, got {}",
                self.sentinel.materiality
            )));
        }
        if self.merge.max_snapshot_lag < 0 {
            return Err(ConfigError::Invalid("merge.max_snapshot_lag must be >= 0".into()));
        }
        Ok(())
    }

    /// BLAKE3 hash of the canonical JSON form, recorded with exports.
    pub fn hash(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_core::domain::DetectorKind;

    #[test]
    fn empty_file_gives_defaults() {
        let config = RadarConfig::from_toml("").unwrap();
        assert_eq!(config, RadarConfig::default());
        assert_eq!(config.scan.min_confidence, 0.6);
        assert_eq!(config.scan.min_history, 60);
        assert_eq!(config.scan.min_avg_turnover, 10_000_000.0);
        assert_eq!(config.scan.turnover_window, 5);
        assert_eq!(config.sentinel.cadence(), Duration::from_secs(300));
        assert_eq!(config.merge.max_snapshot_lag, 1);
        assert_eq!(config.merge.scale.default_volume_ratio, 100.0);
        assert_eq!(config.indicators.macd_slow, 26);
    }

    #[test]
    fn partial_sections_override_defaults() {
        let config = RadarConfig::from_toml(
            r#"
            [scan]
            min_confidence = 0.7
            detectors = ["vcp", "resonance"]

            [scan.params.vcp]
            volume_multiple = 2.5

            [merge.calendar]
            holidays = ["2024-10-01"]

            [sentinel]
            cadence_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.scan.min_confidence, 0.7);
        assert_eq!(
            config.scan.detectors,
            vec![DetectorKind::Vcp, DetectorKind::Resonance]
        );
        assert_eq!(config.scan.params.vcp.volume_multiple, 2.5);
        assert_eq!(config.scan.params.vcp.min_contractions, 2);
        assert_eq!(config.sentinel.cadence_secs, 60);
        assert_eq!(config.sentinel.materiality, 0.10);
        let holiday = chrono::NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
        assert!(!config.merge.calendar.is_session(holiday));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            RadarConfig::from_toml("[scan]\nmin_confidence = 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RadarConfig::from_toml("[indicators]\nmacd_fast = 40"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RadarConfig::from_toml("[scan]\nmin_avg_turnover = -5.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RadarConfig::from_toml("[scan]\nmin_confidence = \"high\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn hash_is_stable_and_sensitive() {
        let a = RadarConfig::default();
        let mut b = RadarConfig::default();
        assert_eq!(a.hash(), b.hash());
        b.scan.min_confidence = 0.7;
        assert_ne!(a.hash(), b.hash());
    }
}
