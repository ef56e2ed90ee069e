//! Subcommand implementations

pub mod show_config;
pub mod simulate;
