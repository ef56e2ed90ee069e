//! Order queues
//!
//! One queue core (ordered order set + dispatch filter + replaceable
//! processor) with three dispatch schedulers:
//!
//! - **Immediate**: dispatch runs on the caller's thread.
//! - **Pooled**: dispatch runs as a drain task on a shared [`WorkerPool`]; at
//!   most one drain task per queue is pending or running at a time.
//! - **Dedicated**: a background thread per queue, parked on a condition
//!   variable tied to the queue lock until an order becomes dispatchable.
//!
//! Locking rules:
//! - the order set and the filter threshold share one lock;
//! - the processor has its own lock, so replacing it never blocks admission;
//! - the processor is never invoked while the order-set lock is held.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

use super::comparator::{OrderComparator, PriorityKey};
use super::error::{DispatchError, DispatchResult};
use super::filter::{DispatchFilter, Threshold};
use super::pool::{panic_message, WorkerPool};
use super::processor::OrderProcessor;
use super::types::Order;

/// Which scheduler a queue uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStrategy {
    Immediate,
    Pooled,
    Dedicated,
}

/// Cloneable handle to an order queue
#[derive(Clone)]
pub struct OrderQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    name: String,
    comparator: OrderComparator,
    state: Mutex<QueueState>,
    processor: RwLock<Option<OrderProcessor>>,
    scheduler: Scheduler,
}

struct QueueState {
    orders: BTreeMap<PriorityKey, Order>,
    filter: DispatchFilter,
    arrivals: u64,
    shutdown: bool,
}

enum Scheduler {
    Immediate,
    Pooled {
        pool: WorkerPool,
        scheduled: AtomicBool,
    },
    Dedicated {
        ready: Condvar,
        worker: Mutex<Option<JoinHandle<()>>>,
    },
}

impl QueueState {
    /// Remove and return the head if the filter lets it through
    fn pop_dispatchable(&mut self) -> Option<Order> {
        let head = self.orders.first_entry()?;
        if self.filter.check(head.get()) {
            Some(head.remove())
        } else {
            None
        }
    }
}

impl OrderQueue {
    fn with_scheduler(name: impl Into<String>, filter: DispatchFilter, scheduler: Scheduler) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                comparator: filter.comparator(),
                state: Mutex::new(QueueState {
                    orders: BTreeMap::new(),
                    filter,
                    arrivals: 0,
                    shutdown: false,
                }),
                processor: RwLock::new(None),
                scheduler,
            }),
        }
    }

    /// Queue that dispatches on the caller's thread
    pub fn immediate(name: impl Into<String>, filter: DispatchFilter) -> Self {
        Self::with_scheduler(name, filter, Scheduler::Immediate)
    }

    /// Queue that dispatches through drain tasks on `pool`
    pub fn pooled(name: impl Into<String>, filter: DispatchFilter, pool: WorkerPool) -> Self {
        Self::with_scheduler(
            name,
            filter,
            Scheduler::Pooled {
                pool,
                scheduled: AtomicBool::new(false),
            },
        )
    }

    /// Queue with its own dispatch thread named `{name}-dispatch`
    pub fn dedicated(name: impl Into<String>, filter: DispatchFilter) -> DispatchResult<Self> {
        let name = name.into();
        let queue = Self::with_scheduler(
            name.clone(),
            filter,
            Scheduler::Dedicated {
                ready: Condvar::new(),
                worker: Mutex::new(None),
            },
        );

        let runner = queue.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-dispatch", name))
            .spawn(move || runner.run_dispatch_thread())
            .map_err(|source| DispatchError::ThreadSpawn {
                queue: name.clone(),
                source,
            })?;

        if let Scheduler::Dedicated { worker, .. } = &queue.inner.scheduler {
            *worker.lock() = Some(handle);
        }
        debug!(queue = %name, "Dispatch thread started");
        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn strategy(&self) -> QueueStrategy {
        match self.inner.scheduler {
            Scheduler::Immediate => QueueStrategy::Immediate,
            Scheduler::Pooled { .. } => QueueStrategy::Pooled,
            Scheduler::Dedicated { .. } => QueueStrategy::Dedicated,
        }
    }

    pub fn comparator(&self) -> OrderComparator {
        self.inner.comparator
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().orders.is_empty()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }

    pub fn threshold(&self) -> Threshold {
        self.inner.state.lock().filter.threshold()
    }

    /// Pending orders in dispatch order
    pub fn pending(&self) -> Vec<Order> {
        self.inner.state.lock().orders.values().cloned().collect()
    }

    /// Add an order, then dispatch whatever has become dispatchable
    pub fn enqueue(&self, order: Order) {
        {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                warn!(
                    queue = %self.inner.name,
                    order_id = order.id,
                    "Queue is shut down, order held but will not be dispatched"
                );
            }
            let key = self.inner.comparator.key(&order, state.arrivals);
            state.arrivals += 1;
            debug!(queue = %self.inner.name, order = %order, "Order queued");
            if let Some(previous) = state.orders.insert(key, order) {
                warn!(
                    queue = %self.inner.name,
                    order_id = previous.id,
                    "Order enqueued twice, keeping the latest copy"
                );
            }
        }
        self.dispatch_orders();
    }

    /// Remove the head order if it is dispatchable under the current threshold
    pub fn dequeue(&self) -> Option<Order> {
        self.inner.state.lock().pop_dispatchable()
    }

    /// Replace the filter threshold, then re-evaluate the queue
    pub fn set_threshold(&self, threshold: Threshold) -> DispatchResult<()> {
        self.refresh_threshold(|| threshold)
    }

    /// Like [`OrderQueue::set_threshold`], but `current` is read while the
    /// order-set lock is held, so the last caller to get the lock always
    /// installs the latest value.
    pub fn refresh_threshold<F>(&self, current: F) -> DispatchResult<()>
    where
        F: FnOnce() -> Threshold,
    {
        {
            let mut state = self.inner.state.lock();
            let threshold = current();
            state.filter.set_threshold(threshold)?;
        }
        self.dispatch_orders();
        Ok(())
    }

    /// Register the callback invoked for each dispatched order
    pub fn set_order_processor(&self, processor: OrderProcessor) {
        debug!(queue = %self.inner.name, ?processor, "Order processor set");
        *self.inner.processor.write() = Some(processor);
    }

    /// Dispatch every currently dispatchable order, in queue order.
    ///
    /// Immediate queues drain on this thread; pooled queues schedule a drain
    /// task unless one is already pending; dedicated queues wake their thread.
    pub fn dispatch_orders(&self) {
        match &self.inner.scheduler {
            Scheduler::Immediate => loop {
                let order = {
                    let mut state = self.inner.state.lock();
                    if state.shutdown {
                        return;
                    }
                    match state.pop_dispatchable() {
                        Some(order) => order,
                        None => return,
                    }
                };
                self.process(order);
            },
            Scheduler::Pooled { pool, scheduled } => {
                if self.inner.state.lock().shutdown {
                    return;
                }
                if scheduled
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return;
                }

                let queue = self.clone();
                if let Err(e) = pool.execute(move || queue.drain_pooled()) {
                    scheduled.store(false, Ordering::Release);
                    warn!(
                        queue = %self.inner.name,
                        pending = self.len(),
                        error = %e,
                        "Drain task rejected, orders stay queued"
                    );
                }
            }
            Scheduler::Dedicated { ready, .. } => {
                let _state = self.inner.state.lock();
                ready.notify_one();
            }
        }
    }

    /// Stop dispatching.
    ///
    /// Immediate queues stop dispatching on enqueue and threshold changes.
    /// Dedicated queues drain what is dispatchable, then their thread exits and
    /// is joined. Pooled queues stop scheduling drain tasks. Orders still
    /// pending afterwards are abandoned and logged.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            if let Scheduler::Dedicated { ready, .. } = &self.inner.scheduler {
                ready.notify_all();
            }
        }

        if let Scheduler::Dedicated { worker, .. } = &self.inner.scheduler {
            let handle = worker.lock().take();
            if let Some(handle) = handle {
                if handle.thread().id() == thread::current().id() {
                    debug!(queue = %self.inner.name, "Shutdown requested from dispatch thread");
                } else if handle.join().is_err() {
                    error!(queue = %self.inner.name, "Dispatch thread panicked");
                }
            }
        }

        let abandoned = self.len();
        if abandoned > 0 {
            warn!(
                queue = %self.inner.name,
                abandoned,
                "Queue shut down with pending orders, they will not be dispatched"
            );
        } else {
            debug!(queue = %self.inner.name, "Queue shut down");
        }
    }

    /// Hand an order to the current processor, outside the order-set lock
    fn process(&self, order: Order) {
        let processor = self.inner.processor.read().clone();
        match processor {
            Some(processor) => {
                let order_id = order.id;
                // A panicking processor drops its order; dispatch carries on
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor.process(order)));
                if let Err(payload) = outcome {
                    error!(
                        queue = %self.inner.name,
                        order_id,
                        panic = panic_message(payload.as_ref()),
                        "Order processor panicked, order dropped"
                    );
                }
            }
            None => warn!(
                queue = %self.inner.name,
                order = %order,
                "No order processor registered, order discarded"
            ),
        }
    }

    fn drain_pooled(&self) {
        let Scheduler::Pooled { scheduled, .. } = &self.inner.scheduler else {
            return;
        };

        loop {
            let order = {
                let mut state = self.inner.state.lock();
                match state.pop_dispatchable() {
                    Some(order) => order,
                    None => {
                        // Cleared under the lock: an enqueue either lands before
                        // this check or sees the flag clear and schedules anew.
                        scheduled.store(false, Ordering::Release);
                        return;
                    }
                }
            };
            self.process(order);
        }
    }

    fn run_dispatch_thread(&self) {
        let Scheduler::Dedicated { ready, .. } = &self.inner.scheduler else {
            return;
        };

        loop {
            let order = {
                let mut state = self.inner.state.lock();
                loop {
                    if let Some(order) = state.pop_dispatchable() {
                        break order;
                    }
                    if state.shutdown {
                        debug!(queue = %self.inner.name, "Dispatch thread exiting");
                        return;
                    }
                    ready.wait(&mut state);
                }
            };
            self.process(order);
        }
    }
}

impl std::fmt::Debug for OrderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderQueue")
            .field("name", &self.inner.name)
            .field("strategy", &self.strategy())
            .field("len", &self.len())
            .finish()
    }
}
