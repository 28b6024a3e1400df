//! Info command - show what is known about a connected device.

use std::path::Path;

use skyup::device::{identify_volume, INFO_FILE_PATH};

use crate::error::CliError;
use crate::runner::load_config;

/// Run the info command.
pub fn run(volume: &Path, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let info = identify_volume(volume)?;
    let urls = info.device_type.archive_urls(&config.archives.base_url);

    println!("SKYTRAXX {}", info.device_type);
    println!("  Volume:     {}", volume.display());
    println!("  Build:      {}", info.software_version);
    println!("  Essentials: {}", urls.essentials);
    println!("  System:     {}", urls.system);

    let mut entries: Vec<_> = info.entries.iter().collect();
    entries.sort();
    println!();
    println!("{}:", INFO_FILE_PATH);
    for (key, value) in entries {
        println!("  {} = {}", key, value);
    }

    Ok(())
}
