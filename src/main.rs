//! Broker simulator - main entry point
//!
//! This binary provides two subcommands:
//! - simulate: Run a scripted market against the broker
//! - show-config: Print the effective configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use concurrent_broker::DispatchMode;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "broker-sim")]
#[command(about = "Simulated stock broker with concurrent order dispatch", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Place the configured orders and replay the scripted market
    Simulate {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/sample.json")]
        config: String,

        /// Dispatch mode: simple, executor or threaded (overrides config file)
        #[arg(short, long)]
        mode: Option<DispatchMode>,
    },

    /// Print the effective configuration as JSON
    ShowConfig {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/sample.json")]
        config: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    // Thread names show which dispatch thread or pool worker handled an order
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // File layer - same format but without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Simulate { .. } => "simulate",
        Commands::ShowConfig { .. } => "show_config",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Simulate { config, mode } => commands::simulate::run(config, mode),
        Commands::ShowConfig { config } => commands::show_config::run(config),
    }
}
