//! YAML sweep description

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ld_channel::ChannelConfig;
use crate::ld_interface::SimTime;
use crate::ld_sweep::{squared_seeds, ParameterGrid, SweepOptions};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sweep: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid sweep: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepMeta {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub separator: String,
    /// Append one row per run to the per-group run tables
    pub per_run_table: bool,
    /// Write device/gateway/server position files per run
    pub write_maps: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("dat"),
            separator: " ".to_string(),
            per_run_table: true,
            write_maps: false,
        }
    }
}

/// Top-level sweep file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub meta: SweepMeta,

    pub grid: ParameterGrid,

    /// Used when `grid.seeds` is empty: seeds 1, 4, ..., r²
    #[serde(default)]
    pub replications: Option<u64>,

    #[serde(default = "default_stop_time")]
    pub stop_time_ms: SimTime,

    #[serde(default)]
    pub parallel: bool,

    /// 0 = warn, 1 = info, 2 = debug, 3 = trace
    #[serde(default)]
    pub verbose: u8,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub channel: ChannelConfig,
}

fn default_stop_time() -> SimTime {
    120_000
}

impl SweepConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: SweepConfig = serde_yaml::from_str(text)?;
        if config.grid.seeds.is_empty() {
            if let Some(r) = config.replications {
                config.grid.seeds = squared_seeds(r);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;
        if grid.seeds.is_empty() {
            return Err(ConfigError::Invalid("no seeds and no replications".to_string()));
        }
        if grid.devices.is_empty() || grid.topologies.is_empty() || grid.periods_ms.is_empty() {
            return Err(ConfigError::Invalid("every grid axis needs at least one value".to_string()));
        }
        if grid.periods_ms.contains(&0) {
            return Err(ConfigError::Invalid("periods must be positive".to_string()));
        }
        if !grid.axis_order_is_valid() {
            return Err(ConfigError::Invalid(format!(
                "axis_order must name topology, devices and period once each, got {:?}",
                grid.axis_order
            )));
        }
        if self.stop_time_ms == 0 {
            return Err(ConfigError::Invalid("stop_time_ms must be positive".to_string()));
        }
        if self.output.separator.is_empty() {
            return Err(ConfigError::Invalid("separator must not be empty".to_string()));
        }
        Ok(())
    }

    /// Name used for output files
    pub fn name(&self) -> String {
        self.meta
            .name
            .clone()
            .unwrap_or_else(|| "sweep".to_string())
            .replace(char::is_whitespace, "_")
    }

    pub fn options(&self) -> SweepOptions {
        SweepOptions {
            stop_time_ms: self.stop_time_ms,
            parallel: self.parallel,
        }
    }

    pub fn log_level(&self) -> log::LevelFilter {
        level_for(self.verbose)
    }
}

/// Log level for a verbosity setting: 0 = warn, 1 = info, 2 = debug, 3 = trace
pub fn level_for(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}
