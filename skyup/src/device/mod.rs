//! Device model: supported SKYTRAXX variants and the archives they use.
//!
//! The update engine only needs two facts about the attached device: which
//! variant it is (selecting the archive URLs) and the installed software
//! build number. Both are captured in an immutable [`DeviceContext`].

mod info;

pub use info::{
    expect_volume_name, identify_volume, parse_info, DeviceInfo, VolumeError, INFO_FILE_PATH,
    SKYTRAXX_VOLUME_NAME,
};

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Default host serving the update archives.
pub const DEFAULT_BASE_URL: &str = "https://www.skytraxx.org";

/// A supported SKYTRAXX device variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceType {
    /// SKYTRAXX 5 mini (`hw = "5mini"`).
    FiveMini,
    /// SKYTRAXX 5 (`hw = "5"`).
    Five,
}

/// Error returned for device tags outside the static table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device type '{0}'")]
pub struct UnknownDeviceType(pub String);

impl DeviceType {
    /// All supported variants.
    pub const ALL: [DeviceType; 2] = [DeviceType::FiveMini, DeviceType::Five];

    /// The tag as written in the device info file.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::FiveMini => "5mini",
            Self::Five => "5",
        }
    }

    /// Path segment and file prefix used on the archive server.
    fn archive_stem(&self) -> &'static str {
        match self {
            Self::FiveMini => "skytraxx5mini",
            Self::Five => "skytraxx5",
        }
    }

    /// Resolve the archive URL pair for this device against `base_url`.
    pub fn archive_urls(&self, base_url: &str) -> ArchiveUrls {
        let base = base_url.trim_end_matches('/');
        let stem = self.archive_stem();
        ArchiveUrls {
            essentials: format!("{base}/{stem}/{stem}-essentials.tar"),
            system: format!("{base}/{stem}/{stem}-system.tar"),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for DeviceType {
    type Err = UnknownDeviceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "5mini" => Ok(Self::FiveMini),
            "5" => Ok(Self::Five),
            other => Err(UnknownDeviceType(other.to_string())),
        }
    }
}

/// The two archives every update consists of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// Maps, airspaces and other content files.
    Essentials,
    /// Firmware and system files.
    System,
}

impl ArchiveKind {
    /// Both archive kinds, in the order they are reported.
    pub const ALL: [ArchiveKind; 2] = [ArchiveKind::Essentials, ArchiveKind::System];

    /// Human-readable name of the archive.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Essentials => "essentials",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Remote locations of a device's two archives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveUrls {
    /// URL of the essentials archive.
    pub essentials: String,
    /// URL of the system archive.
    pub system: String,
}

impl ArchiveUrls {
    /// URL for the given archive kind.
    pub fn get(&self, kind: ArchiveKind) -> &str {
        match kind {
            ArchiveKind::Essentials => &self.essentials,
            ArchiveKind::System => &self.system,
        }
    }
}

/// Immutable snapshot of the attached device consumed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceContext {
    /// Device variant.
    pub device_type: DeviceType,
    /// Installed software build number (`sw` without the `build-` prefix).
    pub software_version: u64,
}

impl DeviceContext {
    /// Create a device context.
    pub fn new(device_type: DeviceType, software_version: u64) -> Self {
        Self {
            device_type,
            software_version,
        }
    }
}

impl From<DeviceInfo> for DeviceContext {
    fn from(info: DeviceInfo) -> Self {
        Self::new(info.device_type, info.software_version)
    }
}
