//! Exchange interface and an in-memory simulated exchange
//!
//! The broker consumes an exchange through the [`Exchange`] trait: it asks for
//! quotes and the open flag, executes trades, and subscribes to price and
//! open/close events through [`ExchangeListener`].

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::{debug, info};

use crate::oms::Order;
use crate::{Price, Symbol};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("market is closed")]
    MarketClosed,

    #[error("unknown symbol: {0}")]
    UnknownSymbol(Symbol),
}

/// Events published by an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeEvent {
    PriceChanged { symbol: Symbol, price: Price },
    MarketOpened,
    MarketClosed,
}

/// Receiver of exchange events
pub trait ExchangeListener: Send + Sync {
    fn on_exchange_event(&self, event: &ExchangeEvent);
}

/// Exchange operations the broker depends on
pub trait Exchange: Send + Sync {
    fn is_open(&self) -> bool;

    /// Symbols currently listed
    fn tickers(&self) -> Vec<Symbol>;

    /// Current price for `symbol`
    fn quote(&self, symbol: &Symbol) -> Option<Price>;

    /// Execute `order` at the current price, returning the execution price
    fn execute_trade(&self, order: &Order) -> Result<Price, ExchangeError>;

    /// Register a listener. Listeners are held weakly and pruned once dropped.
    fn add_listener(&self, listener: Weak<dyn ExchangeListener>);
}

#[derive(Debug, Default)]
struct MarketState {
    open: bool,
    quotes: BTreeMap<Symbol, Price>,
}

/// In-memory exchange with scripted prices
///
/// Listener callbacks run on the thread that changed the market, after the
/// exchange's own locks are released.
#[derive(Default)]
pub struct SimulatedExchange {
    state: RwLock<MarketState>,
    listeners: Mutex<Vec<Weak<dyn ExchangeListener>>>,
    trades: AtomicU64,
}

impl SimulatedExchange {
    pub fn new<I>(open: bool, quotes: I) -> Self
    where
        I: IntoIterator<Item = (Symbol, Price)>,
    {
        Self {
            state: RwLock::new(MarketState {
                open,
                quotes: quotes.into_iter().collect(),
            }),
            listeners: Mutex::new(Vec::new()),
            trades: AtomicU64::new(0),
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn open_market(&self) {
        self.state.write().open = true;
        info!("Market opened");
        self.fire(ExchangeEvent::MarketOpened);
    }

    pub fn close_market(&self) {
        self.state.write().open = false;
        info!("Market closed");
        self.fire(ExchangeEvent::MarketClosed);
    }

    /// Set the price of a listed symbol and notify listeners
    pub fn set_price(&self, symbol: &Symbol, price: Price) -> Result<(), ExchangeError> {
        {
            let mut state = self.state.write();
            let quote = state
                .quotes
                .get_mut(symbol)
                .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.clone()))?;
            *quote = price;
        }
        debug!(%symbol, price, "Price changed");
        self.fire(ExchangeEvent::PriceChanged {
            symbol: symbol.clone(),
            price,
        });
        Ok(())
    }

    /// Number of trades executed so far
    pub fn trade_count(&self) -> u64 {
        self.trades.load(Ordering::SeqCst)
    }

    fn fire(&self, event: ExchangeEvent) {
        let live: Vec<Arc<dyn ExchangeListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|l| l.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener.on_exchange_event(&event);
        }
    }
}

impl Exchange for SimulatedExchange {
    fn is_open(&self) -> bool {
        self.state.read().open
    }

    fn tickers(&self) -> Vec<Symbol> {
        self.state.read().quotes.keys().cloned().collect()
    }

    fn quote(&self, symbol: &Symbol) -> Option<Price> {
        self.state.read().quotes.get(symbol).copied()
    }

    fn execute_trade(&self, order: &Order) -> Result<Price, ExchangeError> {
        let state = self.state.read();
        if !state.open {
            return Err(ExchangeError::MarketClosed);
        }
        let price = state
            .quotes
            .get(&order.symbol)
            .copied()
            .ok_or_else(|| ExchangeError::UnknownSymbol(order.symbol.clone()))?;
        self.trades.fetch_add(1, Ordering::SeqCst);
        info!(order_id = order.id, symbol = %order.symbol, price, "Trade executed");
        Ok(price)
    }

    fn add_listener(&self, listener: Weak<dyn ExchangeListener>) {
        self.listeners.lock().push(listener);
    }
}

impl std::fmt::Debug for SimulatedExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SimulatedExchange")
            .field("open", &state.open)
            .field("quotes", &state.quotes)
            .field("trades", &self.trade_count())
            .finish()
    }
}
