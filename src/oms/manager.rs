//! Per-symbol order manager
//!
//! Owns the stop-buy and stop-sell queues for one stock. Price changes update
//! both filters, which re-evaluates both queues on the spot.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::{DispatchError, DispatchResult};
use super::filter::{DispatchFilter, Threshold};
use super::pool::WorkerPool;
use super::processor::OrderProcessor;
use super::queue::{OrderQueue, QueueStrategy};
use super::types::{Order, OrderKind};
use crate::{Price, Symbol};

/// Stop order queues for one symbol
#[derive(Debug)]
pub struct OrderManager {
    symbol: Symbol,
    price: Mutex<Price>,
    stop_buy: OrderQueue,
    stop_sell: OrderQueue,
}

impl OrderManager {
    fn from_queues(symbol: Symbol, price: Price, stop_buy: OrderQueue, stop_sell: OrderQueue) -> Self {
        info!(%symbol, price, strategy = ?stop_buy.strategy(), "Order manager created");
        Self {
            symbol,
            price: Mutex::new(price),
            stop_buy,
            stop_sell,
        }
    }

    /// Manager whose queues dispatch on the caller's thread
    pub fn immediate(symbol: Symbol, price: Price) -> Self {
        let stop_buy = OrderQueue::immediate(queue_name(&symbol, "StopBuy"), DispatchFilter::stop_buy(price));
        let stop_sell =
            OrderQueue::immediate(queue_name(&symbol, "StopSell"), DispatchFilter::stop_sell(price));
        Self::from_queues(symbol, price, stop_buy, stop_sell)
    }

    /// Manager whose queues dispatch through `pool`
    pub fn pooled(symbol: Symbol, price: Price, pool: &WorkerPool) -> Self {
        let stop_buy = OrderQueue::pooled(
            queue_name(&symbol, "StopBuy"),
            DispatchFilter::stop_buy(price),
            pool.clone(),
        );
        let stop_sell = OrderQueue::pooled(
            queue_name(&symbol, "StopSell"),
            DispatchFilter::stop_sell(price),
            pool.clone(),
        );
        Self::from_queues(symbol, price, stop_buy, stop_sell)
    }

    /// Manager whose queues each run a dedicated dispatch thread
    pub fn dedicated(symbol: Symbol, price: Price) -> DispatchResult<Self> {
        let stop_buy = OrderQueue::dedicated(queue_name(&symbol, "StopBuy"), DispatchFilter::stop_buy(price))?;
        let stop_sell =
            match OrderQueue::dedicated(queue_name(&symbol, "StopSell"), DispatchFilter::stop_sell(price)) {
                Ok(queue) => queue,
                Err(e) => {
                    stop_buy.shutdown();
                    return Err(e);
                }
            };
        Ok(Self::from_queues(symbol, price, stop_buy, stop_sell))
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Last price applied through [`OrderManager::adjust_price`]
    pub fn price(&self) -> Price {
        *self.price.lock()
    }

    pub fn strategy(&self) -> QueueStrategy {
        self.stop_buy.strategy()
    }

    pub fn stop_buy_queue(&self) -> &OrderQueue {
        &self.stop_buy
    }

    pub fn stop_sell_queue(&self) -> &OrderQueue {
        &self.stop_sell
    }

    /// Set both filter thresholds to `price`; each queue re-evaluates immediately
    ///
    /// No lock is held while orders are dispatched, so a processor may call
    /// back into the manager. Each queue reads the price under its own lock,
    /// so the last update wins even when updates race.
    pub fn adjust_price(&self, price: Price) {
        *self.price.lock() = price;
        debug!(symbol = %self.symbol, price, "Adjusting stop thresholds");

        for queue in [&self.stop_buy, &self.stop_sell] {
            if let Err(e) = queue.refresh_threshold(|| Threshold::Price(self.price())) {
                warn!(
                    symbol = %self.symbol,
                    queue = queue.name(),
                    error = %e,
                    "Unable to update stop threshold"
                );
            }
        }
    }

    /// Route a stop order to its queue
    pub fn queue_order(&self, order: Order) -> DispatchResult<()> {
        match order.kind {
            OrderKind::StopBuy => self.stop_buy.enqueue(order),
            OrderKind::StopSell => self.stop_sell.enqueue(order),
            kind => {
                return Err(DispatchError::WrongQueue {
                    queue: self.symbol.to_string(),
                    kind,
                })
            }
        }
        Ok(())
    }

    /// Install the same processor on both queues
    pub fn set_order_processor(&self, processor: OrderProcessor) {
        self.stop_sell.set_order_processor(processor.clone());
        self.stop_buy.set_order_processor(processor);
    }

    /// Orders waiting in both queues
    pub fn pending(&self) -> usize {
        self.stop_buy.len() + self.stop_sell.len()
    }

    pub fn shutdown(&self) {
        self.stop_buy.shutdown();
        self.stop_sell.shutdown();
    }
}

fn queue_name(symbol: &Symbol, kind: &str) -> String {
    format!("{}-{}", symbol, kind)
}
