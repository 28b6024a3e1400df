//! Update command - bring a SKYTRAXX volume up to date.

use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use dialoguer::Confirm;
use skyup::device::{
    expect_volume_name, identify_volume, DeviceContext, DeviceType, SKYTRAXX_VOLUME_NAME,
};
use skyup::manager::{UpdateSummary, Updater};
use tracing::info;

use crate::error::CliError;
use crate::progress::ProgressDisplay;
use crate::runner::CliRunner;

/// Arguments for the update command.
#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Mount point of the SKYTRAXX volume
    pub volume: PathBuf,

    /// Device type tag (5mini or 5); skips reading the device info file
    #[arg(long, requires = "software_version")]
    pub device_type: Option<String>,

    /// Installed software build number; used with --device-type
    #[arg(long, requires = "device_type")]
    pub software_version: Option<u64>,

    /// Do not ask for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Accept volumes not named SKYTRAXX
    #[arg(long)]
    pub any_volume: bool,

    /// Staging directory for downloaded archives
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Maximum attempts per file on stale-handle errors
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub write_attempts: Option<u32>,

    /// Print the result as JSON instead of progress bars
    #[arg(long)]
    pub json: bool,
}

/// Run the update command.
pub fn run(args: UpdateArgs, config_path: Option<&Path>) -> Result<(), CliError> {
    let runner = CliRunner::new(config_path)?;
    runner.log_startup("update");

    if !args.any_volume {
        expect_volume_name(&args.volume, SKYTRAXX_VOLUME_NAME)?;
    }
    let device = resolve_device(&args)?;

    let mut settings = runner.config().clone();
    if let Some(attempts) = args.write_attempts {
        settings.updater.write_attempts = attempts;
    }
    let mut config = settings.to_updater_config();
    if let Some(dir) = &args.staging_dir {
        config = config.with_staging_dir(dir.clone());
    }

    let urls = device.device_type.archive_urls(&config.base_url);
    if !args.json {
        println!("Device:   SKYTRAXX {}", device.device_type);
        println!("Build:    {}", device.software_version);
        println!("Volume:   {}", args.volume.display());
        println!("Archives: {}", urls.essentials);
        println!("          {}", urls.system);
        println!();
    }

    if !args.yes && !confirm(&args.volume)? {
        println!("Update cancelled.");
        return Ok(());
    }

    let updater = Updater::new(config)?;
    let token = updater.cancellation_token();
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping after the current file...");
        token.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let display = (!args.json).then(ProgressDisplay::new);
    let runtime = runner.runtime()?;

    let outcome = runtime.block_on(async {
        let renderer = display.clone().map(|display| {
            let mut rx = updater.progress().subscribe();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let snapshot = rx.borrow_and_update().clone();
                    display.render(&snapshot);
                }
            })
        });

        let outcome = updater.run_detailed(&device, &args.volume).await;
        if let Some(renderer) = renderer {
            renderer.abort();
        }
        outcome
    });

    if let Some(display) = &display {
        display.finish(&updater.progress().snapshot());
    }

    let summary = outcome?.into_summary()?;
    info!(
        written = summary.files_written(),
        skipped = summary.files_skipped(),
        "Update finished"
    );

    if args.json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::Runtime(format!("Failed to encode summary: {}", e)))?;
        println!("{}", json);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Device from the command line, or from the volume's info file.
fn resolve_device(args: &UpdateArgs) -> Result<DeviceContext, CliError> {
    match (&args.device_type, args.software_version) {
        (Some(tag), Some(version)) => {
            let device_type: DeviceType = tag.parse()?;
            Ok(DeviceContext::new(device_type, version))
        }
        _ => Ok(identify_volume(&args.volume)?.into()),
    }
}

fn confirm(volume: &Path) -> Result<bool, CliError> {
    Confirm::new()
        .with_prompt(format!(
            "Update the device at {}? Do not disconnect it while updating",
            volume.display()
        ))
        .default(true)
        .interact()
        .map_err(|e| CliError::Runtime(format!("Failed to read confirmation: {}", e)))
}

fn print_summary(summary: &UpdateSummary) {
    println!();
    println!("{}", style("Update complete").green().bold());
    for report in [&summary.essentials, &summary.system] {
        println!(
            "  {:<10} {:>5} written, {:>5} unchanged, {:>3} directories created ({} bytes)",
            report.archive.name(),
            report.files_written,
            report.files_skipped,
            report.dirs_created,
            report.bytes_downloaded
        );
    }
    println!();
    println!("You can now safely eject the device.");
}
