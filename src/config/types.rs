//! Configuration types and structures.

use crate::format::OutputFormat;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Snapshot store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("schedule-import.db")
}

/// Change detection tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Date shifts shorter than this (in days) are minor.
    #[serde(default = "default_minor_shift_days")]
    pub minor_shift_days: i64,

    /// Date shifts shorter than this (in days) are moderate; longer are significant.
    #[serde(default = "default_moderate_shift_days")]
    pub moderate_shift_days: i64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            minor_shift_days: default_minor_shift_days(),
            moderate_shift_days: default_moderate_shift_days(),
        }
    }
}

fn default_minor_shift_days() -> i64 {
    7
}

fn default_moderate_shift_days() -> i64 {
    30
}

/// Output rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

impl Config {
    /// Load a single config file (no tier merging).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.import.minor_shift_days < 1 {
            bail!("import.minor_shift_days must be at least 1");
        }
        if self.import.moderate_shift_days <= self.import.minor_shift_days {
            bail!("import.moderate_shift_days must exceed import.minor_shift_days");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.store.db_path, PathBuf::from("schedule-import.db"));
        assert_eq!(config.import.minor_shift_days, 7);
        assert_eq!(config.import.moderate_shift_days, 30);
        assert_eq!(config.output.format, OutputFormat::Markdown);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config: Config = serde_yaml::from_str("import:\n  moderate_shift_days: 60\n").unwrap();
        assert_eq!(config.import.minor_shift_days, 7);
        assert_eq!(config.import.moderate_shift_days, 60);
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.import.moderate_shift_days = 5;
        assert!(config.validate().is_err());
    }
}
