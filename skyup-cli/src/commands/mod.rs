//! CLI subcommands.

pub mod config;
pub mod info;
pub mod update;
