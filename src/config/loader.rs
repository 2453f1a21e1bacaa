//! Configuration loader with tier-based merging.

use super::merge::merge_layers;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CONFIG_FILE: &str = "config.yaml";

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    Project = 1,
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for each file-backed tier.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
    /// Explicit config file; when set, tier files are not read.
    pub explicit_file: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        let project_dir = std::env::var("SCHEDULE_IMPORT_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("schedule-import")));

        let user_dir = std::env::var("SCHEDULE_IMPORT_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".schedule-import")));

        let explicit_file = std::env::var("SCHEDULE_IMPORT_CONFIG_PATH")
            .ok()
            .map(PathBuf::from);

        Self {
            project_dir,
            user_dir,
            explicit_file,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
            explicit_file: None,
        }
    }

    pub fn with_explicit_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_file = Some(path.into());
        self
    }

    fn tier_file(&self, tier: ConfigTier) -> Option<PathBuf> {
        let dir = match tier {
            ConfigTier::Project => self.project_dir.as_ref(),
            ConfigTier::User => self.user_dir.as_ref(),
            ConfigTier::Defaults | ConfigTier::Environment => None,
        }?;
        Some(dir.join(CONFIG_FILE))
    }
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Files that contributed, lowest tier first.
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers, including the process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`ConfigLoader::load`], with an explicit config file taking the
    /// place of the tiers when given.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        let mut paths = ConfigPaths::discover();
        if let Some(file) = explicit {
            paths = paths.with_explicit_file(file);
        }
        let mut loader = Self::load_with_paths(paths)?;
        apply_env_overrides(&mut loader.config, |key| std::env::var(key).ok());
        loader.config.validate()?;
        Ok(loader)
    }

    /// Load configuration with explicit paths. Environment overrides are not applied.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        if let Some(ref explicit) = paths.explicit_file {
            let config = Config::load(explicit)?;
            return Ok(Self {
                sources: vec![explicit.clone()],
                paths,
                config,
            });
        }

        let mut layers: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut sources = Vec::new();

        for tier in [ConfigTier::Project, ConfigTier::User] {
            let Some(file) = paths.tier_file(tier) else {
                continue;
            };
            if !file.exists() {
                continue;
            }
            match read_layer(&file) {
                Ok(layer) => {
                    debug!(%tier, path = %file.display(), "Loaded config layer");
                    layers.push(layer);
                    sources.push(file);
                }
                Err(e) => warn!(%tier, path = %file.display(), "Ignoring unreadable config: {:#}", e),
            }
        }

        let config: Config = serde_json::from_value(merge_layers(layers))
            .context("merged configuration is invalid")?;
        config.validate()?;

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Config files that were merged, lowest tier first.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

fn read_layer(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&content)?;
    Ok(value)
}

/// Apply environment variable overrides, using `lookup` to read variables.
pub(crate) fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = lookup("SCHEDULE_IMPORT_DB_PATH") {
        config.store.db_path = PathBuf::from(db_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE), content).unwrap();
    }

    #[test]
    fn test_load_defaults_only() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(
            Some(temp.path().join("project")),
            Some(temp.path().join("user")),
        );

        let loader = ConfigLoader::load_with_paths(paths).unwrap();
        assert_eq!(loader.config(), &Config::default());
        assert!(loader.sources().is_empty());
    }

    #[test]
    fn test_user_config_overrides_project() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("schedule-import");
        let user_dir = temp.path().join("user");
        write_config(
            &project_dir,
            "import:\n  minor_shift_days: 3\n  moderate_shift_days: 21\nstore:\n  db_path: project.db\n",
        );
        write_config(&user_dir, "import:\n  moderate_shift_days: 45\n");

        let loader =
            ConfigLoader::load_with_paths(ConfigPaths::with_dirs(Some(project_dir), Some(user_dir)))
                .unwrap();
        let config = loader.config();

        assert_eq!(config.import.minor_shift_days, 3);
        assert_eq!(config.import.moderate_shift_days, 45);
        assert_eq!(config.store.db_path, PathBuf::from("project.db"));
        assert_eq!(loader.sources().len(), 2);
    }

    #[test]
    fn test_unreadable_tier_is_skipped() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("schedule-import");
        write_config(&project_dir, "import: [not, a, map");

        let loader =
            ConfigLoader::load_with_paths(ConfigPaths::with_dirs(Some(project_dir), None)).unwrap();
        assert_eq!(loader.config(), &Config::default());
    }

    #[test]
    fn test_explicit_file_bypasses_tiers() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("schedule-import");
        write_config(&project_dir, "store:\n  db_path: project.db\n");
        let explicit = temp.path().join("explicit.yaml");
        std::fs::write(&explicit, "output:\n  format: json\n").unwrap();

        let loader = ConfigLoader::load_with_paths(
            ConfigPaths::with_dirs(Some(project_dir), None).with_explicit_file(&explicit),
        )
        .unwrap();
        assert_eq!(loader.config().store.db_path, PathBuf::from("schedule-import.db"));
        assert_eq!(loader.config().output.format, crate::format::OutputFormat::Json);
    }

    #[test]
    fn test_env_override_sets_db_path() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| {
            (key == "SCHEDULE_IMPORT_DB_PATH").then(|| "/tmp/other.db".to_string())
        });
        assert_eq!(config.store.db_path, PathBuf::from("/tmp/other.db"));
    }
}
