//! Queue ordering
//!
//! Orders in a queue are stored in a `BTreeMap` keyed by [`PriorityKey`], so
//! the first key is always the next dispatch candidate. Keys are unique per
//! queue: stop orders end with their order id, market orders with their
//! arrival sequence.

use std::cmp::{Ordering, Reverse};

use super::types::Order;

/// Ordering strategy for one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderComparator {
    /// Arrival order only (market queue)
    Arrival,

    /// Lowest price first, then largest quantity, then lowest id
    StopBuy,

    /// Highest price first, then largest quantity, then lowest id
    StopSell,
}

/// Sort key for a queued order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PriorityKey {
    price: i64,
    quantity: Reverse<u64>,
    tiebreak: u64,
}

impl OrderComparator {
    /// Build the key for `order`, which is the `arrival`-th order admitted to its queue
    pub fn key(&self, order: &Order, arrival: u64) -> PriorityKey {
        match self {
            OrderComparator::Arrival => PriorityKey {
                price: 0,
                quantity: Reverse(0),
                tiebreak: arrival,
            },
            OrderComparator::StopBuy => PriorityKey {
                price: order.limit_price(),
                quantity: Reverse(order.quantity),
                tiebreak: order.id,
            },
            OrderComparator::StopSell => PriorityKey {
                price: order.limit_price().saturating_neg(),
                quantity: Reverse(order.quantity),
                tiebreak: order.id,
            },
        }
    }

    /// Compare two orders of the same kind. For `Arrival`, ids stand in for arrival.
    pub fn compare(&self, a: &Order, b: &Order) -> Ordering {
        self.key(a, a.id).cmp(&self.key(b, b.id))
    }
}
