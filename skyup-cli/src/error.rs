//! CLI error type and exit codes.

use skyup::config::ConfigError;
use skyup::device::{UnknownDeviceType, VolumeError};
use skyup::logging::LoggingError;
use skyup::manager::ManagerError;
use thiserror::Error;

/// Errors surfaced to the user.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid usage or settings.
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Device(#[from] UnknownDeviceType),

    /// The update itself failed.
    #[error(transparent)]
    Update(#[from] ManagerError),

    /// Terminal or runtime failure outside the update engine.
    #[error("{0}")]
    Runtime(String),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// `1` update failed, `2` configuration or usage, `3` volume or device.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Update(_) | Self::Runtime(_) => 1,
            Self::Config(_) | Self::ConfigFile(_) | Self::Logging(_) => 2,
            Self::Volume(_) | Self::Device(_) => 3,
        }
    }
}
