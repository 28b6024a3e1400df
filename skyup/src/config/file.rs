//! INI configuration file.
//!
//! ```ini
//! [archives]
//! base_url = https://www.skytraxx.org
//!
//! [updater]
//! staging_dir = /var/tmp/skyup
//! write_attempts = 10
//! retry_delay_ms = 500
//! retry_backoff = fixed
//! connect_timeout_secs = 30
//! read_timeout_secs = 0
//!
//! [logging]
//! level = info
//! directory = /home/pilot/.local/state/skyup
//! ```
//!
//! Missing keys keep their defaults. A missing file yields the defaults.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;

use super::keys::ConfigKey;
use super::ConfigError;
use crate::device::DEFAULT_BASE_URL;
use crate::logging::LoggingConfig;
use crate::manager::download::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::manager::{
    Backoff, RetryPolicy, UpdaterConfig, DEFAULT_WRITE_ATTEMPTS, STALE_HANDLE_DELAY_MS,
};

/// Directory holding the configuration file.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("skyup")
}

/// Default configuration file location.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.ini")
}

/// `[archives]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivesSettings {
    /// Base of the archive URL table.
    pub base_url: String,
}

/// `[updater]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterSettings {
    /// Staging root; the system temp dir when unset.
    pub staging_dir: Option<PathBuf>,
    /// Maximum attempts on stale-handle write failures.
    pub write_attempts: u32,
    /// Delay before the first retry.
    pub retry_delay_ms: u64,
    /// Spacing of later retries.
    pub retry_backoff: Backoff,
    /// HTTP connect timeout.
    pub connect_timeout_secs: u64,
    /// Whole-request HTTP timeout; `0` disables it.
    pub read_timeout_secs: u64,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Default level filter.
    pub level: String,
    /// Log to `skyup.log` in this directory instead of stderr.
    pub directory: Option<PathBuf>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub archives: ArchivesSettings,
    pub updater: UpdaterSettings,
    pub logging: LoggingSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            archives: ArchivesSettings {
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            updater: UpdaterSettings {
                staging_dir: None,
                write_attempts: DEFAULT_WRITE_ATTEMPTS,
                retry_delay_ms: STALE_HANDLE_DELAY_MS,
                retry_backoff: Backoff::Fixed,
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
                read_timeout_secs: 0,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                directory: None,
            },
        }
    }
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            if let Some(value) = ini.get_from(Some(key.section()), key.key_name()) {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, replacing any existing file atomically.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |e: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        };

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(write_error)?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(write_error)?;
        ini.write_to(&mut temp).map_err(write_error)?;
        temp.flush().map_err(write_error)?;
        temp.persist(path).map_err(|e| write_error(e.error))?;
        Ok(())
    }

    /// Engine configuration derived from this file.
    pub fn to_updater_config(&self) -> UpdaterConfig {
        let mut config = UpdaterConfig::new()
            .with_base_url(self.archives.base_url.clone())
            .with_write_policy(RetryPolicy::for_writes(
                self.updater.write_attempts,
                Duration::from_millis(self.updater.retry_delay_ms),
                self.updater.retry_backoff,
            ))
            .with_connect_timeout(Duration::from_secs(self.updater.connect_timeout_secs))
            .with_read_timeout(
                (self.updater.read_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.updater.read_timeout_secs)),
            );
        if let Some(dir) = &self.updater.staging_dir {
            config = config.with_staging_dir(dir.clone());
        }
        config
    }

    /// Logging configuration derived from this file.
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.logging.level.clone(),
            directory: self.logging.directory.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_load_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(
            &path,
            "[updater]\nwrite_attempts = 4\nread_timeout_secs = 120\n\n[logging]\nlevel = debug\n",
        )
        .unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.updater.write_attempts, 4);
        assert_eq!(config.updater.read_timeout_secs, 120);
        assert_eq!(config.updater.retry_delay_ms, 500);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.archives.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, "[updater]\nwrite_attempts = many\n").unwrap();

        match ConfigFile::load_from(&path) {
            Err(ConfigError::InvalidValue { key, value }) => {
                assert_eq!(key, "updater.write_attempts");
                assert_eq!(value, "many");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/config.ini");

        let mut config = ConfigFile::default();
        config.archives.base_url = "http://mirror.local".to_string();
        config.updater.staging_dir = Some(temp.path().join("staging"));
        config.logging.directory = Some(temp.path().join("logs"));
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_to_updater_config() {
        let mut config = ConfigFile::default();
        config.updater.write_attempts = 3;
        config.updater.retry_delay_ms = 250;
        config.updater.read_timeout_secs = 60;
        config.updater.staging_dir = Some(PathBuf::from("/tmp/stage"));

        let updater = config.to_updater_config();
        assert_eq!(
            updater.write_policy,
            RetryPolicy::fixed(3, Duration::from_millis(250))
        );
        assert_eq!(updater.read_timeout, Some(Duration::from_secs(60)));
        assert_eq!(updater.staging_dir, PathBuf::from("/tmp/stage"));
        assert_eq!(updater.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_retry_backoff_selects_policy() {
        let mut config = ConfigFile::default();
        config.updater.write_attempts = 5;
        config.updater.retry_backoff = Backoff::Exponential;
        assert_eq!(
            config.to_updater_config().write_policy,
            RetryPolicy::exponential(5, Duration::from_millis(500))
        );

        config.updater.write_attempts = 1;
        assert_eq!(config.to_updater_config().write_policy, RetryPolicy::None);
    }

    #[test]
    fn test_default_timeouts_match_engine_defaults() {
        let from_file = ConfigFile::default().to_updater_config();
        let engine = UpdaterConfig::default();
        assert_eq!(from_file.connect_timeout, engine.connect_timeout);
        assert_eq!(from_file.write_policy, engine.write_policy);
    }

    #[test]
    fn test_default_read_timeout_is_disabled() {
        assert_eq!(ConfigFile::default().to_updater_config().read_timeout, None);
    }

    #[test]
    fn test_config_file_path_name() {
        let path = config_file_path();
        assert!(path.ends_with("skyup/config.ini"));
    }
}
