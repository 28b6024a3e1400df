//! User configuration stored as an INI file.

mod file;
mod keys;

pub use file::{
    config_dir, config_file_path, ArchivesSettings, ConfigFile, LoggingSettings, UpdaterSettings,
};
pub use keys::ConfigKey;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read or parsed.
    #[error("failed to read config file {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    /// The file could not be written.
    #[error("failed to write config file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    /// A setting has a value of the wrong shape.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },

    /// No such setting.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),
}
