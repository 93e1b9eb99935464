//! Configuration loading and management.

use std::path::{Path, PathBuf};

use est_core::{CalendarConfig, DEFAULT_HISTORY_DEPTH, Effort};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Capacity of a working day, in hours.
    pub workday_hours: u32,

    /// Days the allocator walks forward before recording a shortfall.
    pub horizon_days: u32,

    /// Maximum number of undoable transactions kept.
    pub history_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("est.db"),
            workday_hours: 8,
            horizon_days: 365,
            history_depth: DEFAULT_HISTORY_DEPTH,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (EST_*)
        figment = figment.merge(Env::prefixed("EST_"));

        figment.extract()
    }

    /// Capacity and horizon settings for the allocator.
    pub const fn calendar(&self) -> CalendarConfig {
        CalendarConfig {
            workday_capacity: Effort::from_hours(self.workday_hours),
            horizon_days: self.horizon_days,
        }
    }
}

/// Returns the platform-specific config directory for est.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("est"))
}

/// Returns the platform-specific data directory for est.
///
/// On Linux: `~/.local/share/est`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("est"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_est() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "est");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("est.db"));
        assert_eq!(config.calendar(), CalendarConfig::default());
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "workday_hours = 6\nhistory_depth = 5\n").unwrap();

        let config = Config::load_from(Some(&path)).unwrap();

        assert_eq!(config.workday_hours, 6);
        assert_eq!(config.history_depth, 5);
        assert_eq!(config.horizon_days, 365);
        assert_eq!(config.calendar().workday_capacity, Effort::from_hours(6));
    }
}
