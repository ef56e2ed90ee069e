//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files, with environment
//! variable overrides for the broker's dispatch settings.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::broker::DispatchMode;
use crate::oms::{Order, OrderKind, DEFAULT_POOL_SIZE};
use crate::{Balance, Price, Symbol};

/// Default bound on waiting for pooled dispatch tasks at close
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 1000;

/// Overrides `broker.mode`
pub const ENV_MODE: &str = "BROKER_MODE";

/// Overrides `broker.pool_size`
pub const ENV_POOL_SIZE: &str = "BROKER_POOL_SIZE";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from a JSON file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BROKER_MODE` / `BROKER_POOL_SIZE` from the environment or a `.env` file
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        dotenv::dotenv().ok();
        let mode = std::env::var(ENV_MODE).ok();
        let pool_size = std::env::var(ENV_POOL_SIZE).ok();
        self.apply_overrides(mode.as_deref(), pool_size.as_deref())
    }

    fn apply_overrides(&mut self, mode: Option<&str>, pool_size: Option<&str>) -> Result<()> {
        if let Some(mode) = mode {
            self.broker.mode = mode
                .parse()
                .with_context(|| format!("Invalid {}", ENV_MODE))?;
            info!("Dispatch mode overridden to: {}", self.broker.mode);
        }
        if let Some(size) = pool_size {
            self.broker.pool_size = size
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: '{}'", ENV_POOL_SIZE, size))?;
            info!("Pool size overridden to: {}", self.broker.pool_size);
        }
        Ok(())
    }

    /// Reject settings the broker cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.broker.name.trim().is_empty() {
            bail!("broker.name must not be empty");
        }
        if self.broker.pool_size == 0 {
            bail!("broker.pool_size must be at least 1");
        }

        let sim = &self.simulation;
        for ticker in &sim.tickers {
            if ticker.price <= 0 {
                bail!("ticker {} has non-positive price {}", ticker.symbol, ticker.price);
            }
        }
        for event in &sim.events {
            if let MarketEvent::Price { symbol, .. } = event {
                if !sim.tickers.iter().any(|t| &t.symbol == symbol) {
                    bail!("price event for unlisted symbol {}", symbol);
                }
            }
        }
        Ok(())
    }
}

/// Broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub name: String,
    pub mode: DispatchMode,
    /// Worker threads shared by stop queues in `executor` mode
    pub pool_size: usize,
    pub shutdown_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            name: "broker".to_string(),
            mode: DispatchMode::Simple,
            pool_size: DEFAULT_POOL_SIZE,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

/// Scripted market used by the `simulate` command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Market state when the broker starts
    pub market_open: bool,
    pub tickers: Vec<TickerConfig>,
    pub accounts: Vec<AccountConfig>,
    /// Orders placed before the events are replayed
    pub orders: Vec<OrderConfig>,
    /// Market events replayed in order
    pub events: Vec<MarketEvent>,
}

/// Listed symbol and its opening price
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerConfig {
    pub symbol: Symbol,
    pub price: Price,
}

/// Account and its opening balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    pub balance: Balance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfig {
    pub account: String,
    pub symbol: Symbol,
    pub kind: OrderKind,
    pub quantity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
}

impl OrderConfig {
    /// Build the order described by this entry
    pub fn to_order(&self) -> Result<Order> {
        let symbol = self.symbol.clone();
        let order = match (self.kind, self.price) {
            (OrderKind::MarketBuy, None) => Order::market_buy(&self.account, symbol, self.quantity),
            (OrderKind::MarketSell, None) => Order::market_sell(&self.account, symbol, self.quantity),
            (OrderKind::StopBuy, Some(price)) => {
                Order::stop_buy(&self.account, symbol, self.quantity, price)
            }
            (OrderKind::StopSell, Some(price)) => {
                Order::stop_sell(&self.account, symbol, self.quantity, price)
            }
            (kind, None) => bail!("{:?} order for {} needs a price", kind, self.symbol),
            (kind, Some(_)) => bail!("{:?} order for {} must not set a price", kind, self.symbol),
        };
        Ok(order)
    }
}

/// One step of the scripted market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    Price { symbol: Symbol, price: Price },
    Open,
    Close,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "broker": { "name": "sim", "mode": "executor", "pool_size": 2 },
        "simulation": {
            "market_open": false,
            "tickers": [ { "symbol": "BA", "price": 100 } ],
            "accounts": [ { "id": "neo", "balance": 10000 } ],
            "orders": [
                { "account": "neo", "symbol": "BA", "kind": "stop_buy", "quantity": 10, "price": 110 },
                { "account": "neo", "symbol": "BA", "kind": "market_sell", "quantity": 1 }
            ],
            "events": [
                { "type": "price", "symbol": "BA", "price": 110 },
                { "type": "open" }
            ]
        }
    }"#;

    #[test]
    fn test_parse_sample() {
        let config: Config = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(config.broker.mode, DispatchMode::Executor);
        assert_eq!(config.broker.pool_size, 2);
        assert_eq!(config.broker.shutdown_timeout_ms, DEFAULT_SHUTDOWN_TIMEOUT_MS);
        assert_eq!(config.simulation.orders.len(), 2);
        assert_eq!(config.simulation.events[1], MarketEvent::Open);
        assert!(config.validate().is_ok());

        let order = config.simulation.orders[0].to_order().unwrap();
        assert_eq!(order.kind, OrderKind::StopBuy);
        assert_eq!(order.price, Some(110));
    }

    #[test]
    fn test_defaults_for_empty_document() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.broker.name, "broker");
        assert_eq!(config.broker.mode, DispatchMode::Simple);
        assert_eq!(config.broker.pool_size, DEFAULT_POOL_SIZE);
        assert!(config.simulation.tickers.is_empty());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(Some("threaded"), Some(" 8 ")).unwrap();
        assert_eq!(config.broker.mode, DispatchMode::Threaded);
        assert_eq!(config.broker.pool_size, 8);

        assert!(config.apply_overrides(Some("bogus"), None).is_err());
        assert!(config.apply_overrides(None, Some("many")).is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.broker.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.simulation.events.push(MarketEvent::Price {
            symbol: Symbol::new("XYZ"),
            price: 5,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_order_entry_price_rules() {
        let entry = OrderConfig {
            account: "neo".to_string(),
            symbol: Symbol::new("BA"),
            kind: OrderKind::StopSell,
            quantity: 1,
            price: None,
        };
        assert!(entry.to_order().is_err());

        let entry = OrderConfig {
            kind: OrderKind::MarketBuy,
            price: Some(3),
            ..entry
        };
        assert!(entry.to_order().is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file("does/not/exist.json").is_err());
    }
}
