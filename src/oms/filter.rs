//! Dispatch filters
//!
//! A filter owns one threshold and decides whether a queued order may leave
//! its queue right now. The filter lives inside its queue's locked state, so
//! threshold updates and dequeues are serialized by the same lock.

use tracing::trace;

use super::comparator::OrderComparator;
use super::error::{DispatchError, DispatchResult};
use super::types::Order;
use crate::Price;

/// Value a filter compares orders against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    /// Market open flag (market filter)
    MarketOpen(bool),

    /// Current share price (stop filters)
    Price(Price),
}

/// Closed set of dispatch filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchFilter {
    /// All-or-nothing gate on the market being open
    Market { open: bool },

    /// Dispatch buy stops whose limit is at or below the current price
    StopBuy { price: Price },

    /// Dispatch sell stops whose limit is at or above the current price
    StopSell { price: Price },
}

impl DispatchFilter {
    pub fn market(open: bool) -> Self {
        DispatchFilter::Market { open }
    }

    pub fn stop_buy(price: Price) -> Self {
        DispatchFilter::StopBuy { price }
    }

    pub fn stop_sell(price: Price) -> Self {
        DispatchFilter::StopSell { price }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DispatchFilter::Market { .. } => "market",
            DispatchFilter::StopBuy { .. } => "stop-buy",
            DispatchFilter::StopSell { .. } => "stop-sell",
        }
    }

    /// Test whether `order` may be dispatched under the current threshold
    pub fn check(&self, order: &Order) -> bool {
        match *self {
            DispatchFilter::Market { open } => {
                trace!(order_id = order.id, open, "market order dispatchable: {}", open);
                open
            }
            DispatchFilter::StopBuy { price } => {
                let dispatch = order.limit_price() <= price;
                trace!(
                    order_id = order.id,
                    desired = order.limit_price(),
                    current = price,
                    dispatch,
                    "stop-buy check"
                );
                dispatch
            }
            DispatchFilter::StopSell { price } => {
                let dispatch = order.limit_price() >= price;
                trace!(
                    order_id = order.id,
                    desired = order.limit_price(),
                    current = price,
                    dispatch,
                    "stop-sell check"
                );
                dispatch
            }
        }
    }

    pub fn threshold(&self) -> Threshold {
        match *self {
            DispatchFilter::Market { open } => Threshold::MarketOpen(open),
            DispatchFilter::StopBuy { price } | DispatchFilter::StopSell { price } => {
                Threshold::Price(price)
            }
        }
    }

    /// Replace the threshold. A threshold of the wrong type leaves the filter unchanged.
    pub fn set_threshold(&mut self, threshold: Threshold) -> DispatchResult<()> {
        match (self, threshold) {
            (DispatchFilter::Market { open }, Threshold::MarketOpen(value)) => {
                *open = value;
                Ok(())
            }
            (DispatchFilter::StopBuy { price }, Threshold::Price(value))
            | (DispatchFilter::StopSell { price }, Threshold::Price(value)) => {
                *price = value;
                Ok(())
            }
            (filter, threshold) => Err(DispatchError::ThresholdMismatch {
                filter: filter.name(),
                threshold,
            }),
        }
    }

    /// Ordering that pairs with this filter: the head of the queue is always
    /// the first order to become dispatchable.
    pub fn comparator(&self) -> OrderComparator {
        match self {
            DispatchFilter::Market { .. } => OrderComparator::Arrival,
            DispatchFilter::StopBuy { .. } => OrderComparator::StopBuy,
            DispatchFilter::StopSell { .. } => OrderComparator::StopSell,
        }
    }
}
