//! Broker
//!
//! Front door of the dispatch engine. The broker owns one [`OrderManager`]
//! per symbol for stop orders and a single market queue, routes placed orders
//! to them, and turns exchange events into threshold updates:
//!
//! - price change: the symbol's manager adjusts both stop thresholds;
//! - market open/close: the market queue's gate flips, flushing it on open.
//!
//! Stop orders that trigger are moved into the market queue; market orders
//! that pass the gate are executed on the exchange and settled against the
//! placing account.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::account::{AccountError, AccountManager};
use crate::config::{BrokerConfig, DEFAULT_SHUTDOWN_TIMEOUT_MS};
use crate::exchange::{Exchange, ExchangeEvent, ExchangeListener};
use crate::oms::{
    DispatchError, DispatchFilter, Order, OrderError, OrderId, OrderManager, OrderProcessor,
    OrderQueue, Threshold, WorkerPool,
};
use crate::{Balance, Price, Symbol};

/// Name of the broker's market order queue
pub const MARKET_QUEUE: &str = "MARKET";

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker is closed")]
    Closed,

    #[error("invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("no quote for symbol {0}")]
    UnknownSymbol(Symbol),

    #[error("account error: {0}")]
    Account(#[from] AccountError),
}

/// How the broker's queues dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Every queue dispatches on the thread that triggered it
    #[default]
    Simple,

    /// Stop queues share a worker pool, the market queue has its own thread
    Executor,

    /// Every queue has its own dispatch thread
    Threaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dispatch mode '{0}' (expected simple, executor or threaded)")]
pub struct ParseDispatchModeError(String);

impl FromStr for DispatchMode {
    type Err = ParseDispatchModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(DispatchMode::Simple),
            "executor" => Ok(DispatchMode::Executor),
            "threaded" => Ok(DispatchMode::Threaded),
            _ => Err(ParseDispatchModeError(s.to_string())),
        }
    }
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DispatchMode::Simple => "simple",
            DispatchMode::Executor => "executor",
            DispatchMode::Threaded => "threaded",
        };
        f.write_str(name)
    }
}

/// Simulated stock broker
pub struct Broker {
    name: String,
    mode: DispatchMode,
    exchange: Arc<dyn Exchange>,
    accounts: Arc<dyn AccountManager>,
    pool: Option<WorkerPool>,
    market_queue: OrderQueue,
    managers: RwLock<HashMap<Symbol, Arc<OrderManager>>>,
    closed: AtomicBool,
    shutdown_timeout: Duration,
}

impl Broker {
    /// Build a broker and subscribe it to `exchange`.
    ///
    /// Order managers are created up front for every listed ticker, seeded
    /// with its current quote.
    pub fn new(
        name: impl Into<String>,
        mode: DispatchMode,
        pool_size: usize,
        exchange: Arc<dyn Exchange>,
        accounts: Arc<dyn AccountManager>,
    ) -> Result<Arc<Self>, BrokerError> {
        let shutdown_timeout = Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS);
        Self::build(name.into(), mode, pool_size, shutdown_timeout, exchange, accounts)
    }

    /// Build a broker from its configuration section
    pub fn from_config(
        config: &BrokerConfig,
        exchange: Arc<dyn Exchange>,
        accounts: Arc<dyn AccountManager>,
    ) -> Result<Arc<Self>, BrokerError> {
        Self::build(
            config.name.clone(),
            config.mode,
            config.pool_size,
            Duration::from_millis(config.shutdown_timeout_ms),
            exchange,
            accounts,
        )
    }

    fn build(
        name: String,
        mode: DispatchMode,
        pool_size: usize,
        shutdown_timeout: Duration,
        exchange: Arc<dyn Exchange>,
        accounts: Arc<dyn AccountManager>,
    ) -> Result<Arc<Self>, BrokerError> {
        let open = exchange.is_open();

        let pool = match mode {
            DispatchMode::Executor => Some(WorkerPool::new(format!("{}-pool", name), pool_size)?),
            DispatchMode::Simple | DispatchMode::Threaded => None,
        };

        let filter = DispatchFilter::market(open);
        let market_queue = match mode {
            DispatchMode::Simple => OrderQueue::immediate(MARKET_QUEUE, filter),
            DispatchMode::Executor | DispatchMode::Threaded => {
                OrderQueue::dedicated(MARKET_QUEUE, filter)?
            }
        };
        market_queue.set_order_processor(OrderProcessor::execute_trade(
            Arc::clone(&exchange),
            Arc::clone(&accounts),
        ));

        let broker = Arc::new(Self {
            name,
            mode,
            exchange,
            accounts,
            pool,
            market_queue,
            managers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            shutdown_timeout,
        });

        for symbol in broker.exchange.tickers() {
            match broker.exchange.quote(&symbol) {
                Some(price) => {
                    broker.manager_or_insert(&symbol, price)?;
                }
                None => warn!(broker = %broker.name, %symbol, "Listed ticker has no quote, skipping"),
            }
        }

        let listener: Weak<dyn ExchangeListener> = Arc::downgrade(&broker) as Weak<dyn ExchangeListener>;
        broker.exchange.add_listener(listener);

        info!(
            broker = %broker.name,
            mode = %broker.mode,
            market_open = open,
            symbols = broker.managers.read().len(),
            "Broker started"
        );
        Ok(broker)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn market_queue(&self) -> &OrderQueue {
        &self.market_queue
    }

    /// Manager for `symbol`, if one exists yet
    pub fn manager(&self, symbol: &Symbol) -> Option<Arc<OrderManager>> {
        self.managers.read().get(symbol).cloned()
    }

    /// Symbols with an order manager, sorted
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<_> = self.managers.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Orders still waiting in any queue
    pub fn pending_orders(&self) -> usize {
        let stops: usize = self.managers.read().values().map(|m| m.pending()).sum();
        stops + self.market_queue.len()
    }

    /// Validate an order and route it to its queue
    pub fn place_order(&self, order: Order) -> Result<OrderId, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::Closed);
        }
        order.validate()?;

        let id = order.id;
        info!(broker = %self.name, order = %order, "Order placed");
        if order.kind.is_stop() {
            let manager = self.manager_for(&order.symbol)?;
            manager.queue_order(order)?;
        } else {
            self.market_queue.enqueue(order);
        }
        Ok(id)
    }

    /// Current balance of an account
    pub fn account_balance(&self, account_id: &str) -> Result<Balance, BrokerError> {
        Ok(self.accounts.get_account(account_id)?.balance)
    }

    /// Apply a price change to the symbol's manager, creating it if needed
    pub fn price_changed(&self, symbol: &Symbol, price: Price) -> Result<(), BrokerError> {
        if let Some(manager) = self.manager(symbol) {
            manager.adjust_price(price);
            return Ok(());
        }
        // A freshly created manager is already seeded with this price
        self.manager_or_insert(symbol, price)?;
        Ok(())
    }

    pub fn market_opened(&self) {
        info!(broker = %self.name, "Market opened, releasing market orders");
        self.set_market_open(true);
    }

    pub fn market_closed(&self) {
        info!(broker = %self.name, "Market closed, holding market orders");
        self.set_market_open(false);
    }

    /// Stop accepting orders and shut every queue down.
    ///
    /// Stop queues go first, then the worker pool (bounded by the shutdown
    /// timeout), then the market queue. Closing twice is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(broker = %self.name, "Closing broker");

        let managers: Vec<_> = self.managers.read().values().cloned().collect();
        for manager in managers {
            manager.shutdown();
        }

        if let Some(pool) = &self.pool {
            pool.shutdown(self.shutdown_timeout);
        }

        self.market_queue.shutdown();
        info!(broker = %self.name, pending = self.pending_orders(), "Broker closed");
    }

    fn set_market_open(&self, open: bool) {
        // The market filter always takes an open flag
        if let Err(e) = self.market_queue.set_threshold(Threshold::MarketOpen(open)) {
            warn!(broker = %self.name, error = %e, "Unable to update market queue");
        }
    }

    /// Existing manager, or one seeded with the exchange's current quote
    fn manager_for(&self, symbol: &Symbol) -> Result<Arc<OrderManager>, BrokerError> {
        if let Some(manager) = self.manager(symbol) {
            return Ok(manager);
        }
        let price = self
            .exchange
            .quote(symbol)
            .ok_or_else(|| BrokerError::UnknownSymbol(symbol.clone()))?;
        self.manager_or_insert(symbol, price)
    }

    fn manager_or_insert(&self, symbol: &Symbol, price: Price) -> Result<Arc<OrderManager>, BrokerError> {
        let mut managers = self.managers.write();
        if let Some(manager) = managers.get(symbol) {
            return Ok(Arc::clone(manager));
        }

        let manager = match (&self.pool, self.mode) {
            (_, DispatchMode::Simple) => OrderManager::immediate(symbol.clone(), price),
            (Some(pool), DispatchMode::Executor) => OrderManager::pooled(symbol.clone(), price, pool),
            (_, DispatchMode::Executor | DispatchMode::Threaded) => {
                OrderManager::dedicated(symbol.clone(), price)?
            }
        };
        manager.set_order_processor(OrderProcessor::move_to(self.market_queue.clone()));

        let manager = Arc::new(manager);
        managers.insert(symbol.clone(), Arc::clone(&manager));
        debug!(broker = %self.name, %symbol, price, "Order manager registered");
        Ok(manager)
    }
}

impl ExchangeListener for Broker {
    fn on_exchange_event(&self, event: &ExchangeEvent) {
        if self.is_closed() {
            debug!(broker = %self.name, ?event, "Broker closed, ignoring exchange event");
            return;
        }
        match event {
            ExchangeEvent::PriceChanged { symbol, price } => {
                if let Err(e) = self.price_changed(symbol, *price) {
                    warn!(broker = %self.name, %symbol, error = %e, "Unable to apply price change");
                }
            }
            ExchangeEvent::MarketOpened => self.market_opened(),
            ExchangeEvent::MarketClosed => self.market_closed(),
        }
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("symbols", &self.managers.read().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
