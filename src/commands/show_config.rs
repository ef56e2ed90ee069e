//! Show-config command implementation

use anyhow::{Context, Result};
use concurrent_broker::Config;
use tracing::info;

pub fn run(config_path: String) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("{}", json);
    Ok(())
}
