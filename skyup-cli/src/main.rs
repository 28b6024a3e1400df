//! Skyup CLI - update SKYTRAXX flight instruments from the command line.
//!
//! This binary provides a command-line interface to the skyup library.

mod commands;
mod error;
mod progress;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;

use commands::config::ConfigCommands;
use commands::update::UpdateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "skyup", version, about = "Selective updater for SKYTRAXX devices")]
struct Cli {
    /// Use this configuration file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Update the firmware and content of a connected device
    Update(UpdateArgs),

    /// Show the device type, installed build and archive URLs
    Info {
        /// Mount point of the SKYTRAXX volume
        volume: PathBuf,
    },

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Update(args) => commands::update::run(args, config_path),
        Commands::Info { volume } => commands::info::run(&volume, config_path),
        Commands::Config { command } => commands::config::run(command, config_path),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update_with_overrides() {
        let cli = Cli::try_parse_from([
            "skyup",
            "update",
            "/media/SKYTRAXX",
            "--device-type",
            "5mini",
            "--software-version",
            "1234",
            "--yes",
        ])
        .unwrap();

        match cli.command {
            Commands::Update(args) => {
                assert_eq!(args.volume, PathBuf::from("/media/SKYTRAXX"));
                assert_eq!(args.device_type.as_deref(), Some("5mini"));
                assert_eq!(args.software_version, Some(1234));
                assert!(args.yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_device_type_requires_software_version() {
        let result = Cli::try_parse_from([
            "skyup",
            "update",
            "/media/SKYTRAXX",
            "--device-type",
            "5",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_write_attempts_must_be_positive() {
        let result =
            Cli::try_parse_from(["skyup", "update", "/media/SKYTRAXX", "--write-attempts", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["skyup", "config", "path", "--config", "/tmp/skyup.ini"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/skyup.ini")));
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Path
            }
        ));
    }
}
