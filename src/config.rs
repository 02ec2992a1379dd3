use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SquadRsError;
use crate::logging::{LogConfig, LogFormat, LogLevel};
use crate::models::TeamId;

/// Rows fetched per page when reading fact tables
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application metadata
    pub metadata: ConfigMetadata,

    /// Database location and fetch settings
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Computation defaults
    #[serde(default)]
    pub engine: EngineSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Database settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite database file
    pub path: PathBuf,

    /// Rows per page for paginated reads
    pub page_size: usize,
}

/// Computation defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Team computed when the CLI is not given one
    pub default_team_id: Option<TeamId>,

    /// Persist outputs after computing
    #[serde(default = "default_persist")]
    pub persist: bool,
}

/// Logging settings as stored in TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Level name ("trace" .. "error")
    pub level: String,

    /// "pretty", "json" or "compact"
    pub format: String,

    /// Optional log file; rotated daily when set
    pub file_path: Option<PathBuf>,
}

fn default_persist() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();
        AppConfig {
            metadata: ConfigMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: now,
                updated_at: now,
            },
            database: DatabaseSettings::default(),
            engine: EngineSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: PathBuf::from("squadrs.db"),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            default_team_id: None,
            persist: default_persist(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl LoggingSettings {
    /// Build the subscriber configuration, rejecting unknown level or format names
    pub fn to_log_config(&self) -> crate::error::Result<LogConfig> {
        let level = self
            .level
            .parse::<LogLevel>()
            .map_err(|e| SquadRsError::Configuration(format!("logging.level: {}", e)))?;
        let format = self
            .format
            .parse::<LogFormat>()
            .map_err(|e| SquadRsError::Configuration(format!("logging.format: {}", e)))?;

        Ok(LogConfig {
            level,
            format,
            file_path: self.file_path.clone(),
            ..LogConfig::default()
        })
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".squadrs")
            .join("config.toml")
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.database.page_size == 0 {
            return Err(SquadRsError::Configuration(
                "database.page_size must be greater than zero".to_string(),
            ));
        }
        self.logging.to_log_config()?;
        Ok(())
    }

    /// Team to compute: explicit argument first, then the configured default
    pub fn resolve_team(&self, explicit: Option<TeamId>) -> crate::error::Result<TeamId> {
        explicit.or(self.engine.default_team_id).ok_or_else(|| {
            SquadRsError::Configuration(
                "no team id given and engine.default_team_id is not set".to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.database, deserialized.database);
        assert_eq!(config.engine, deserialized.engine);
        assert_eq!(deserialized.database.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.engine.default_team_id = Some(42);
        config.database.page_size = 250;
        config.save_to_file(&config_path).unwrap();

        let loaded = AppConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.engine.default_team_id, Some(42));
        assert_eq!(loaded.database.page_size, 250);
        assert!(loaded.engine.persist);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let toml_str = r#"
            [metadata]
            version = "0.1.0"
            created_at = "2025-01-01T00:00:00Z"
            updated_at = "2025-01-01T00:00:00Z"
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.database, DatabaseSettings::default());
        assert_eq!(config.engine.default_team_id, None);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validation_rejects_zero_page_size() {
        let mut config = AppConfig::default();
        config.database.page_size = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_invalid_file_reports_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.logging.format = "xml".to_string();
        config.save_to_file(&config_path).unwrap();

        let err = AppConfig::load_from_file(&config_path).unwrap_err();
        let cause = err.downcast_ref::<SquadRsError>().unwrap();
        assert_eq!(cause.kind(), "configuration_error");
    }

    #[test]
    fn test_logging_settings_conversion() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            format: "json".to_string(),
            file_path: None,
        };
        let log_config = settings.to_log_config().unwrap();
        assert_eq!(log_config.level, LogLevel::Debug);
        assert_eq!(log_config.format, LogFormat::Json);

        let bad = LoggingSettings {
            level: "loud".to_string(),
            ..LoggingSettings::default()
        };
        assert!(bad.to_log_config().is_err());
    }

    #[test]
    fn test_resolve_team() {
        let mut config = AppConfig::default();
        assert_eq!(config.resolve_team(None).unwrap_err().kind(), "configuration_error");
        assert_eq!(config.resolve_team(Some(5)).unwrap(), 5);

        config.engine.default_team_id = Some(9);
        assert_eq!(config.resolve_team(None).unwrap(), 9);
        assert_eq!(config.resolve_team(Some(5)).unwrap(), 5);
    }
}
