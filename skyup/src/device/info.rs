//! Device identification from the volume's `hwsw.info` file.
//!
//! Every SKYTRAXX volume carries `.sys/hwsw.info`, a list of `key = "value"`
//! lines. `hw` names the device variant and `sw` the installed build, e.g.
//! `sw = "build-1234"`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::DeviceType;

/// Location of the info file relative to the volume root.
pub const INFO_FILE_PATH: &str = ".sys/hwsw.info";

/// Name of the volume a SKYTRAXX device mounts as.
pub const SKYTRAXX_VOLUME_NAME: &str = "SKYTRAXX";

const HW_KEY: &str = "hw";
const SW_KEY: &str = "sw";
const BUILD_PREFIX: &str = "build-";

/// Errors raised while identifying a device volume.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// The selected path does not exist.
    #[error("SKYTRAXX could not be found at {}", .0.display())]
    NotFound(PathBuf),

    /// The selected path is not a SKYTRAXX volume.
    #[error("{} is not a SKYTRAXX volume", .0.display())]
    WrongVolume(PathBuf),

    /// The info file exists but could not be read.
    #[error("failed to access SKYTRAXX at {}", .0.display())]
    AccessDenied(PathBuf),

    /// The device variant is missing or not supported.
    #[error("unsupported SKYTRAXX device type: {0}")]
    UnsupportedDevice(String),

    /// The `sw` entry is missing or not a build number.
    #[error("invalid software version in device info: {0}")]
    InvalidSoftwareVersion(String),

    /// Any other I/O failure while reading the volume.
    #[error("unexpected error reading {}: {source}", path.display())]
    Unexpected { path: PathBuf, source: io::Error },
}

/// What the info file says about the attached device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device variant (`hw`).
    pub device_type: DeviceType,
    /// Installed build number (`sw`, prefix stripped).
    pub software_version: u64,
    /// All key/value pairs from the info file.
    pub entries: HashMap<String, String>,
}

/// Parse `key = "value"` lines into a map.
///
/// Lines are split on the first `=`. Keys are trimmed; values have every
/// double quote removed and are then trimmed. Lines without `=` are ignored
/// and later duplicates win.
pub fn parse_info(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            (
                key.trim().to_string(),
                value.replace('"', "").trim().to_string(),
            )
        })
        .collect()
}

/// Read and validate the device info of the volume mounted at `root`.
pub fn identify_volume(root: &Path) -> Result<DeviceInfo, VolumeError> {
    let metadata = fs::metadata(root).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => VolumeError::NotFound(root.to_path_buf()),
        io::ErrorKind::PermissionDenied => VolumeError::AccessDenied(root.to_path_buf()),
        _ => VolumeError::Unexpected {
            path: root.to_path_buf(),
            source: e,
        },
    })?;
    if !metadata.is_dir() {
        return Err(VolumeError::WrongVolume(root.to_path_buf()));
    }

    let info_path = root.join(INFO_FILE_PATH);
    let content = fs::read_to_string(&info_path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => VolumeError::WrongVolume(root.to_path_buf()),
        io::ErrorKind::PermissionDenied => VolumeError::AccessDenied(info_path.clone()),
        _ => VolumeError::Unexpected {
            path: info_path.clone(),
            source: e,
        },
    })?;

    let entries = parse_info(&content);
    debug!(path = %info_path.display(), keys = entries.len(), "Parsed device info");

    let hw = entries
        .get(HW_KEY)
        .ok_or_else(|| VolumeError::UnsupportedDevice("missing hw entry".to_string()))?;
    let device_type: DeviceType = hw
        .parse()
        .map_err(|_| VolumeError::UnsupportedDevice(hw.clone()))?;

    let sw = entries
        .get(SW_KEY)
        .ok_or_else(|| VolumeError::InvalidSoftwareVersion("missing sw entry".to_string()))?;
    let software_version = sw
        .replace(BUILD_PREFIX, "")
        .parse::<u64>()
        .map_err(|_| VolumeError::InvalidSoftwareVersion(sw.clone()))?;

    Ok(DeviceInfo {
        device_type,
        software_version,
        entries,
    })
}

/// Check that the volume is mounted under the expected name.
///
/// The mount point's final path component is used as the volume name.
pub fn expect_volume_name(root: &Path, expected: &str) -> Result<(), VolumeError> {
    match root.file_name() {
        Some(name) if name == expected => Ok(()),
        _ => Err(VolumeError::WrongVolume(root.to_path_buf())),
    }
}
