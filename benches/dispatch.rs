//! Dispatch throughput benchmarks
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concurrent_broker::oms::{
    DispatchFilter, OrderProcessor, OrderQueue, Threshold, WorkerPool,
};
use concurrent_broker::{Order, Symbol};

const BATCH: usize = 1_000;

fn counting_processor() -> (OrderProcessor, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    (
        OrderProcessor::callback(move |order| {
            black_box(order);
            counter.fetch_add(1, Ordering::Relaxed);
        }),
        count,
    )
}

fn wait_for(count: &AtomicUsize, target: usize) {
    while count.load(Ordering::Relaxed) < target {
        std::hint::spin_loop();
    }
}

/// Queue a batch of stop buys above the market, then release them with one price move
fn benchmark_stop_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("stop_release");
    let symbol = Symbol::new("BA");
    let pool = WorkerPool::new("bench", 4).ok();

    for strategy in ["immediate", "pooled", "dedicated"] {
        group.bench_with_input(BenchmarkId::from_parameter(strategy), &strategy, |b, &strategy| {
            b.iter(|| {
                let filter = DispatchFilter::stop_buy(0);
                let queue = match (strategy, &pool) {
                    ("pooled", Some(pool)) => OrderQueue::pooled("BA-StopBuy", filter, pool.clone()),
                    ("dedicated", _) => match OrderQueue::dedicated("BA-StopBuy", filter) {
                        Ok(queue) => queue,
                        Err(_) => return,
                    },
                    _ => OrderQueue::immediate("BA-StopBuy", filter),
                };
                let (processor, count) = counting_processor();
                queue.set_order_processor(processor);

                for i in 0..BATCH {
                    queue.enqueue(Order::stop_buy("bench", symbol.clone(), 1, 1 + (i % 100) as i64));
                }
                let _ = queue.set_threshold(Threshold::Price(1_000));
                wait_for(&count, BATCH);
                queue.shutdown();
            })
        });
    }
    group.finish();

    if let Some(pool) = pool {
        pool.shutdown(Duration::from_secs(1));
    }
}

/// Enqueue into an open market queue, dispatching each order on arrival
fn benchmark_market_enqueue(c: &mut Criterion) {
    let queue = OrderQueue::immediate("MARKET", DispatchFilter::market(true));
    let (processor, _count) = counting_processor();
    queue.set_order_processor(processor);
    let symbol = Symbol::new("F");

    c.bench_function("market_enqueue_dispatch", |b| {
        b.iter(|| queue.enqueue(Order::market_buy("bench", symbol.clone(), 1)))
    });
}

criterion_group!(benches, benchmark_stop_release, benchmark_market_enqueue);
criterion_main!(benches);
