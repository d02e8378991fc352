use super::app_config::EngineConfig;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to determine config directory")]
    ConfigDirNotFound,
    #[error("invalid configuration values: {}", .0.join(", "))]
    Invalid(Vec<&'static str>),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

/// Reads and writes `config.toml` under the engine's config directory.
pub struct StorageManager {
    config_dir: PathBuf,
}

impl StorageManager {
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigDirNotFound` when the platform has no config directory.
    pub fn new() -> Result<Self, ConfigError> {
        let config_dir = EngineConfig::default_config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
        Ok(Self { config_dir })
    }

    #[must_use]
    pub fn with_dir(path: PathBuf) -> Self {
        Self { config_dir: path }
    }

    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// # Errors
    ///
    /// Returns `ConfigError` if the directory cannot be created.
    pub fn ensure_config_dir(&self) -> Result<(), ConfigError> {
        if !self.config_dir.exists() {
            info!(path = %self.config_dir.display(), "Creating configuration directory");
            fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    fn config_path(&self, path_override: Option<&Path>) -> PathBuf {
        path_override.map_or_else(|| self.config_dir.join(CONFIG_FILE_NAME), Path::to_path_buf)
    }

    /// Loads the engine configuration, writing a default file when none exists.
    ///
    /// A file that does not parse yields the defaults and is left untouched.
    /// Values no loader can honor are reset in the returned configuration
    /// only; the file keeps what the user wrote.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or the default cannot be written.
    pub fn load_config(&self, path_override: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        let config_path = self.config_path(path_override);
        if path_override.is_none() {
            self.ensure_config_dir()?;
        }

        if !config_path.exists() {
            info!(path = %config_path.display(), "Config file not found, writing defaults");
            let default_config = EngineConfig::default();
            Self::write_atomically(&config_path, &default_config)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&config_path)?;
        let mut config = match toml::from_str::<EngineConfig>(&content) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Failed to parse config file, using defaults");
                return Ok(EngineConfig::default());
            }
        };

        let repaired = config.repair();
        if !repaired.is_empty() {
            warn!(path = %config_path.display(), ?repaired, "Reset invalid configuration values");
        }
        debug!(
            path = %config_path.display(),
            image_budget_mib = config.cache.image_budget_mib,
            policy = ?config.notifications.policy,
            thumbnail_size = config.thumbnails.size,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Saves the configuration atomically.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` without touching the file when the
    /// configuration holds values no loader can honor, or another
    /// `ConfigError` if the file cannot be written.
    pub fn save_config(
        &self,
        config: &EngineConfig,
        path_override: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let invalid = config.invalid_keys();
        if !invalid.is_empty() {
            return Err(ConfigError::Invalid(invalid));
        }
        if path_override.is_none() {
            self.ensure_config_dir()?;
        }
        Self::write_atomically(&self.config_path(path_override), config)
    }

    /// Writes next to `path` and renames over it, so readers never see a partial file.
    fn write_atomically(path: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.persist(path).map_err(|e| e.error)?;

        Ok(())
    }
}
