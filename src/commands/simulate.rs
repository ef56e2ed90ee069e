//! Simulate command implementation
//!
//! Builds an in-memory exchange and account book from the config, starts a
//! broker over them, places the configured orders and replays the scripted
//! market events. Closing the broker drains whatever is still dispatchable.

use anyhow::{Context, Result};
use concurrent_broker::config::MarketEvent;
use concurrent_broker::{
    AccountManager, Broker, Config, DispatchMode, InMemoryAccountManager, SimulatedExchange,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub fn run(config_path: String, mode_override: Option<DispatchMode>) -> Result<()> {
    info!("Starting simulation");

    let mut config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    if let Some(mode) = mode_override {
        info!("Overriding dispatch mode to: {}", mode);
        config.broker.mode = mode;
    }

    let sim = &config.simulation;
    let exchange = Arc::new(SimulatedExchange::new(
        sim.market_open,
        sim.tickers.iter().map(|t| (t.symbol.clone(), t.price)),
    ));

    let accounts = Arc::new(InMemoryAccountManager::new());
    for account in &sim.accounts {
        accounts
            .create_account(account.id.clone(), account.balance)
            .with_context(|| format!("Failed to create account {}", account.id))?;
    }

    let broker = Broker::from_config(&config.broker, exchange.clone(), accounts.clone())
        .context("Failed to start broker")?;

    let started = Instant::now();
    let mut placed = 0usize;
    let mut rejected = 0usize;
    for entry in &sim.orders {
        let order = entry.to_order()?;
        match broker.place_order(order) {
            Ok(id) => {
                debug!("Placed order #{}", id);
                placed += 1;
            }
            Err(e) => {
                warn!("Order rejected: {}", e);
                rejected += 1;
            }
        }
    }
    info!("Placed {} orders ({} rejected)", placed, rejected);

    for event in &sim.events {
        match event {
            MarketEvent::Price { symbol, price } => exchange
                .set_price(symbol, *price)
                .with_context(|| format!("Failed to move {} to {}", symbol, price))?,
            MarketEvent::Open => exchange.open_market(),
            MarketEvent::Close => exchange.close_market(),
        }
    }

    broker.close();
    let elapsed = started.elapsed();

    println!();
    println!("{}", "=".repeat(60));
    println!("SIMULATION RESULTS ({} mode)", broker.mode());
    println!("{}", "=".repeat(60));
    println!("Orders placed:     {:>10}", placed);
    println!("Orders rejected:   {:>10}", rejected);
    println!("Trades executed:   {:>10}", exchange.trade_count());
    println!("Orders pending:    {:>10}", broker.pending_orders());
    println!("Elapsed:           {:>10.2?}", elapsed);
    println!("{}", "-".repeat(60));
    println!("{:<20} {:>15}", "ACCOUNT", "BALANCE");
    for account in &sim.accounts {
        let balance = accounts.get_account(&account.id)?.balance;
        println!("{:<20} {:>15}", account.id, balance);
    }
    println!("{}", "=".repeat(60));

    info!("Simulation complete");
    Ok(())
}
