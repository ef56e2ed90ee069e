//! Concurrent Broker
//!
//! A simulated stock broker built around an order dispatch engine: stop and
//! market orders are held in priority queues and released to trade execution
//! as exchange prices move and the market opens and closes, using immediate,
//! pooled or dedicated-thread dispatch.

pub mod account;
pub mod broker;
pub mod config;
pub mod exchange;
pub mod oms;
pub mod types;

pub use account::{Account, AccountError, AccountManager, InMemoryAccountManager};
pub use broker::{Broker, BrokerError, DispatchMode};
pub use config::Config;
pub use exchange::{Exchange, ExchangeError, ExchangeEvent, ExchangeListener, SimulatedExchange};
pub use oms::{Order, OrderKind};
pub use types::*;
