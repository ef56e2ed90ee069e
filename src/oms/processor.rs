//! Order processors
//!
//! A processor is invoked exactly once per dispatched order and takes
//! ownership of it. Processors are cheap to clone (every variant is a handle),
//! which lets a queue copy the current processor out of its lock and run it
//! with no lock held.

use std::sync::Arc;
use tracing::{error, info};

use super::queue::OrderQueue;
use super::types::Order;
use crate::account::AccountManager;
use crate::exchange::Exchange;

/// Executes orders on the exchange and settles them against the account
#[derive(Clone)]
pub struct TradeExecutor {
    exchange: Arc<dyn Exchange>,
    accounts: Arc<dyn AccountManager>,
}

impl TradeExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, accounts: Arc<dyn AccountManager>) -> Self {
        Self { exchange, accounts }
    }

    /// Execute, then settle. Failures are logged and the order is dropped.
    ///
    /// The trade is not rolled back if settlement fails: the exchange has
    /// already executed it, and the account balance will not reflect it.
    pub fn process(&self, order: Order) {
        info!(order = %order, "Executing");

        let share_price = match self.exchange.execute_trade(&order) {
            Ok(price) => price,
            Err(e) => {
                error!(order_id = order.id, error = %e, "Trade execution failed, order dropped");
                return;
            }
        };

        if let Err(e) = self.accounts.reflect_order(&order, share_price) {
            error!(
                order_id = order.id,
                account = %order.account_id,
                error = %e,
                "Unable to update account"
            );
        }
    }
}

/// Closed set of order processors
#[derive(Clone)]
pub enum OrderProcessor {
    /// Execute the trade and update the account
    ExecuteTrade(TradeExecutor),

    /// Re-enqueue into another queue (stop order promoted to the market queue)
    MoveToQueue(OrderQueue),

    /// Arbitrary callback
    Callback(Arc<dyn Fn(Order) + Send + Sync>),
}

impl OrderProcessor {
    pub fn execute_trade(exchange: Arc<dyn Exchange>, accounts: Arc<dyn AccountManager>) -> Self {
        OrderProcessor::ExecuteTrade(TradeExecutor::new(exchange, accounts))
    }

    pub fn move_to(queue: OrderQueue) -> Self {
        OrderProcessor::MoveToQueue(queue)
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Order) + Send + Sync + 'static,
    {
        OrderProcessor::Callback(Arc::new(f))
    }

    pub fn process(&self, order: Order) {
        match self {
            OrderProcessor::ExecuteTrade(executor) => executor.process(order),
            OrderProcessor::MoveToQueue(queue) => {
                info!(order = %order, queue = queue.name(), "Moving order to queue");
                queue.enqueue(order);
            }
            OrderProcessor::Callback(f) => f(order),
        }
    }
}

impl std::fmt::Debug for OrderProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderProcessor::ExecuteTrade(_) => write!(f, "ExecuteTrade"),
            OrderProcessor::MoveToQueue(queue) => write!(f, "MoveToQueue({})", queue.name()),
            OrderProcessor::Callback(_) => write!(f, "Callback"),
        }
    }
}
