//! Typed access to individual configuration settings by `section.key` name.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::file::ConfigFile;
use super::ConfigError;
use crate::manager::Backoff;

/// A single configuration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    ArchivesBaseUrl,
    UpdaterStagingDir,
    UpdaterWriteAttempts,
    UpdaterRetryDelayMs,
    UpdaterRetryBackoff,
    UpdaterConnectTimeoutSecs,
    UpdaterReadTimeoutSecs,
    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    /// All keys, grouped by section.
    pub fn all() -> &'static [ConfigKey] {
        &[
            Self::ArchivesBaseUrl,
            Self::UpdaterStagingDir,
            Self::UpdaterWriteAttempts,
            Self::UpdaterRetryDelayMs,
            Self::UpdaterRetryBackoff,
            Self::UpdaterConnectTimeoutSecs,
            Self::UpdaterReadTimeoutSecs,
            Self::LoggingLevel,
            Self::LoggingDirectory,
        ]
    }

    /// INI section name.
    pub fn section(&self) -> &'static str {
        match self {
            Self::ArchivesBaseUrl => "archives",
            Self::UpdaterStagingDir
            | Self::UpdaterWriteAttempts
            | Self::UpdaterRetryDelayMs
            | Self::UpdaterRetryBackoff
            | Self::UpdaterConnectTimeoutSecs
            | Self::UpdaterReadTimeoutSecs => "updater",
            Self::LoggingLevel | Self::LoggingDirectory => "logging",
        }
    }

    /// Key name within the section.
    pub fn key_name(&self) -> &'static str {
        match self {
            Self::ArchivesBaseUrl => "base_url",
            Self::UpdaterStagingDir => "staging_dir",
            Self::UpdaterWriteAttempts => "write_attempts",
            Self::UpdaterRetryDelayMs => "retry_delay_ms",
            Self::UpdaterRetryBackoff => "retry_backoff",
            Self::UpdaterConnectTimeoutSecs => "connect_timeout_secs",
            Self::UpdaterReadTimeoutSecs => "read_timeout_secs",
            Self::LoggingLevel => "level",
            Self::LoggingDirectory => "directory",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as a string; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        let path = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        match self {
            Self::ArchivesBaseUrl => config.archives.base_url.clone(),
            Self::UpdaterStagingDir => path(&config.updater.staging_dir),
            Self::UpdaterWriteAttempts => config.updater.write_attempts.to_string(),
            Self::UpdaterRetryDelayMs => config.updater.retry_delay_ms.to_string(),
            Self::UpdaterRetryBackoff => config.updater.retry_backoff.name().to_string(),
            Self::UpdaterConnectTimeoutSecs => config.updater.connect_timeout_secs.to_string(),
            Self::UpdaterReadTimeoutSecs => config.updater.read_timeout_secs.to_string(),
            Self::LoggingLevel => config.logging.level.clone(),
            Self::LoggingDirectory => path(&config.logging.directory),
        }
    }

    /// Validate and store a value.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        let invalid = || ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
        };
        let optional_path = |v: &str| (!v.is_empty()).then(|| PathBuf::from(v));

        match self {
            Self::ArchivesBaseUrl => {
                reqwest::Url::parse(value).map_err(|_| invalid())?;
                config.archives.base_url = value.trim_end_matches('/').to_string();
            }
            Self::UpdaterStagingDir => config.updater.staging_dir = optional_path(value),
            Self::UpdaterWriteAttempts => {
                config.updater.write_attempts = value
                    .parse()
                    .ok()
                    .filter(|attempts| *attempts >= 1)
                    .ok_or_else(invalid)?;
            }
            Self::UpdaterRetryDelayMs => {
                config.updater.retry_delay_ms = value.parse().map_err(|_| invalid())?;
            }
            Self::UpdaterRetryBackoff => {
                config.updater.retry_backoff = Backoff::parse(value).ok_or_else(invalid)?;
            }
            Self::UpdaterConnectTimeoutSecs => {
                config.updater.connect_timeout_secs = value.parse().map_err(|_| invalid())?;
            }
            Self::UpdaterReadTimeoutSecs => {
                config.updater.read_timeout_secs = value.parse().map_err(|_| invalid())?;
            }
            Self::LoggingLevel => {
                value.parse::<tracing::Level>().map_err(|_| invalid())?;
                config.logging.level = value.to_ascii_lowercase();
            }
            Self::LoggingDirectory => config.logging.directory = optional_path(value),
        }
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}
