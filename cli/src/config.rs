//! Configuration file support for the `nina` command line.
//!
//! Search order:
//! 1. Path given with `--config`
//! 2. `./nina.toml`
//! 3. `<config dir>/nina/nina.toml`
//!
//! Every section is optional; missing keys take their defaults.

use anyhow::{Context, Result};
use nina_sequencer::astro::ObserverLocation;
use nina_sequencer::simulator::SimulatorOptions;
use nina_sequencer::EstimationMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "nina.toml";

/// Slowest simulated equipment we accept, as a multiple of real time
pub const MAX_TIME_SCALE: f64 = 100.0;

/// Clamp a simulator time scale to `0.0..=MAX_TIME_SCALE`; NaN becomes `0.0`
pub fn sanitize_time_scale(scale: f64) -> f64 {
    if scale.is_nan() {
        return 0.0;
    }
    scale.clamp(0.0, MAX_TIME_SCALE)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub logging: LoggingConfig,
    pub observer: ObserverConfig,
    pub sequencer: SequencerConfig,
    pub simulator: SimulatorOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set (trace, debug, info, warn, error)
    pub level: String,
    /// Directory for daily rolling log files; console only when unset
    pub directory: Option<PathBuf>,
    /// Days of log files to keep
    pub keep_days: i64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            keep_days: 7,
        }
    }
}

/// Observer site used by altitude conditions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ObserverConfig {
    pub fn location(&self) -> Option<ObserverLocation> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(ObserverLocation {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub estimation_mode: EstimationMode,
}

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("nina").join(CONFIG_FILE_NAME));
    }
    paths
}

impl CliConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load the explicit path if given, otherwise the first file found on the search path.
    ///
    /// Returns the defaults and `None` when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load_from_file(path)?, Some(path.to_path_buf())));
        }
        for path in config_search_paths() {
            if path.exists() {
                return Ok((Self::load_from_file(&path)?, Some(path)));
            }
        }
        Ok((Self::default(), None))
    }

    /// The simulator options with the configured observer filled in
    pub fn simulator_options(&self) -> SimulatorOptions {
        let mut options = self.simulator.clone();
        let time_scale = sanitize_time_scale(options.time_scale);
        if time_scale != options.time_scale {
            tracing::warn!(
                "Simulator time_scale {} is out of range, using {}",
                options.time_scale,
                time_scale
            );
            options.time_scale = time_scale;
        }
        if let Some(location) = self.observer.location() {
            options.observer = Some(location);
        }
        options
    }
}
