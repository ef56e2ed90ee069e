//! Property-based tests for order dispatch
//!
//! These tests use proptest to check queue ordering and filter invariants
//! across many random order books and price paths.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use concurrent_broker::oms::{
    DispatchFilter, OrderComparator, OrderProcessor, OrderQueue, Threshold,
};
use concurrent_broker::{Order, Symbol};
use parking_lot::Mutex;
use proptest::prelude::*;

fn stop_buys(specs: &[(u64, i64)]) -> Vec<Order> {
    specs
        .iter()
        .map(|&(qty, price)| Order::stop_buy("acct", Symbol::new("BA"), qty, price))
        .collect()
}

fn stop_sells(specs: &[(u64, i64)]) -> Vec<Order> {
    specs
        .iter()
        .map(|&(qty, price)| Order::stop_sell("acct", Symbol::new("BA"), qty, price))
        .collect()
}

fn order_specs() -> impl Strategy<Value = Vec<(u64, i64)>> {
    prop::collection::vec((1u64..20, 1i64..200), 1..60)
}

fn recording_queue(filter: DispatchFilter) -> (OrderQueue, Arc<Mutex<Vec<Order>>>) {
    let queue = OrderQueue::immediate("BA", filter);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    queue.set_order_processor(OrderProcessor::callback(move |order| sink.lock().push(order)));
    (queue, seen)
}

proptest! {
    /// Stop buys leave only when priced at or below the threshold, cheapest first
    #[test]
    fn stop_buy_dispatch_respects_threshold(
        specs in order_specs(),
        threshold in 1i64..200,
    ) {
        let (queue, seen) = recording_queue(DispatchFilter::stop_buy(0));
        for order in stop_buys(&specs) {
            queue.enqueue(order);
        }
        prop_assert!(seen.lock().is_empty());

        queue.set_threshold(Threshold::Price(threshold)).unwrap();
        prop_assert_eq!(queue.dequeue(), None);

        let dispatched = seen.lock().clone();
        for order in &dispatched {
            prop_assert!(order.limit_price() <= threshold);
        }
        for pair in dispatched.windows(2) {
            prop_assert_ne!(OrderComparator::StopBuy.compare(&pair[0], &pair[1]), Ordering::Greater);
        }
        for order in queue.pending() {
            prop_assert!(order.limit_price() > threshold);
        }
        prop_assert_eq!(dispatched.len() + queue.len(), specs.len());
    }

    /// Stop sells leave only when priced at or above the threshold, dearest first
    #[test]
    fn stop_sell_dispatch_respects_threshold(
        specs in order_specs(),
        threshold in 1i64..200,
    ) {
        let (queue, seen) = recording_queue(DispatchFilter::stop_sell(i64::MAX));
        for order in stop_sells(&specs) {
            queue.enqueue(order);
        }
        prop_assert!(seen.lock().is_empty());

        queue.set_threshold(Threshold::Price(threshold)).unwrap();
        let dispatched = seen.lock().clone();
        for order in &dispatched {
            prop_assert!(order.limit_price() >= threshold);
        }
        for pair in dispatched.windows(2) {
            prop_assert!(pair[0].limit_price() >= pair[1].limit_price());
        }
        for order in queue.pending() {
            prop_assert!(order.limit_price() < threshold);
        }
    }

    /// Comparators are antisymmetric and only tie an order with itself
    #[test]
    fn comparator_is_total(specs in order_specs()) {
        for (comparator, orders) in [
            (OrderComparator::StopBuy, stop_buys(&specs)),
            (OrderComparator::StopSell, stop_sells(&specs)),
        ] {
            for a in &orders {
                for b in &orders {
                    let ab = comparator.compare(a, b);
                    prop_assert_eq!(ab, comparator.compare(b, a).reverse());
                    prop_assert_eq!(ab == Ordering::Equal, a.id == b.id);
                }
            }

            // Sorting with the comparator matches the queue's own order
            let mut sorted = orders.clone();
            sorted.sort_by(|a, b| comparator.compare(a, b));
            let filter = match comparator {
                OrderComparator::StopSell => DispatchFilter::stop_sell(i64::MAX),
                _ => DispatchFilter::stop_buy(0),
            };
            let queue = OrderQueue::immediate("BA", filter);
            for order in orders {
                queue.enqueue(order);
            }
            let queued: Vec<_> = queue.pending().into_iter().map(|o| o.id).collect();
            let expected: Vec<_> = sorted.into_iter().map(|o| o.id).collect();
            prop_assert_eq!(queued, expected);
        }
    }

    /// Along any price path each order is dispatched at most once, and every
    /// order is either dispatched or still queued
    #[test]
    fn price_path_dispatches_each_order_once(
        specs in order_specs(),
        path in prop::collection::vec(1i64..200, 1..20),
    ) {
        let (queue, seen) = recording_queue(DispatchFilter::stop_sell(i64::MAX));
        let orders = stop_sells(&specs);
        let all: HashSet<_> = orders.iter().map(|o| o.id).collect();

        for (i, order) in orders.into_iter().enumerate() {
            queue.enqueue(order);
            if let Some(price) = path.get(i) {
                queue.set_threshold(Threshold::Price(*price)).unwrap();
            }
        }
        for price in &path {
            queue.set_threshold(Threshold::Price(*price)).unwrap();
        }

        let dispatched: Vec<_> = seen.lock().iter().map(|o| o.id).collect();
        let unique: HashSet<_> = dispatched.iter().copied().collect();
        prop_assert_eq!(unique.len(), dispatched.len());

        let pending: HashSet<_> = queue.pending().into_iter().map(|o| o.id).collect();
        prop_assert!(unique.is_disjoint(&pending));
        let covered: HashSet<_> = unique.union(&pending).copied().collect();
        prop_assert_eq!(covered, all);

        // Anything still queued is not dispatchable at the final price
        let last = *path.last().unwrap();
        prop_assert!(queue.pending().iter().all(|o| o.limit_price() < last));
    }
}
