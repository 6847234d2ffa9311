//! Daemon configuration.
//!
//! A TOML file with `[network]`, `[leds]` and `[logging]` sections. Every key
//! is optional and falls back to its default.

use anyhow::{Context, Result, bail, ensure};
use ethled_lib::Thresholds;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

/// Commented example written by `--write-config`.
const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("default_config.toml");

/// Searched in order when no path is given on the command line.
pub const SEARCH_PATHS: [&str; 2] = ["./ethled.toml", "/etc/ethled.toml"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub interface: String,
    pub capacity_mbps: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            capacity_mbps: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedConfig {
    pub brightness: u8,
    pub low_threshold: u8,
    pub medium_threshold: u8,
    pub high_threshold: u8,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            brightness: 255,
            low_threshold: 10,
            medium_threshold: 40,
            high_threshold: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub leds: LedConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads the configuration from `explicit`, or from the first of
    /// [`SEARCH_PATHS`] that exists. Falls back to defaults when nothing is
    /// found. Returns the file that was used, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            ensure!(path.exists(), "Config file {} does not exist", path.display());
            return Ok((Self::load_from(path)?, Some(path.to_path_buf())));
        }

        for candidate in SEARCH_PATHS.iter().map(Path::new) {
            if candidate.exists() {
                return Ok((Self::load_from(candidate)?, Some(candidate.to_path_buf())));
            }
        }
        Ok((Self::default(), None))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks. Threshold ordering is not checked.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.network.interface.is_empty(), "network.interface must not be empty");
        ensure!(self.network.capacity_mbps > 0, "network.capacity_mbps must be greater than 0");
        for (name, value) in [
            ("low_threshold", self.leds.low_threshold),
            ("medium_threshold", self.leds.medium_threshold),
            ("high_threshold", self.leds.high_threshold),
        ] {
            ensure!(value <= 100, "leds.{} must be between 0 and 100, got {}", name, value);
        }
        self.level_filter()?;
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            low: f64::from(self.leds.low_threshold),
            medium: f64::from(self.leds.medium_threshold),
            high: f64::from(self.leds.high_threshold),
        }
    }

    /// The configured log level. `warning` is accepted as an alias of `warn`.
    pub fn level_filter(&self) -> Result<LevelFilter> {
        let level = self.logging.level.trim().to_ascii_lowercase();
        let level = if level == "warning" { "warn".to_string() } else { level };
        level
            .parse()
            .map_err(|_| anyhow::anyhow!("Unknown log level '{}'", self.logging.level))
    }

    /// Writes the commented example configuration to `path`.
    /// Refuses to overwrite an existing file.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, DEFAULT_CONFIG_TEMPLATE)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
