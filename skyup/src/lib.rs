//! Skyup - selective incremental updates for SKYTRAXX flight instruments
//!
//! This library downloads the firmware and content archives for a connected
//! device, unpacks them, and copies only the files that changed onto the
//! device's storage volume.
//!
//! - [`device`]: device identification and the archive URL table
//! - [`manager`]: the update engine
//! - [`config`]: the user configuration file
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod device;
pub mod logging;
pub mod manager;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
