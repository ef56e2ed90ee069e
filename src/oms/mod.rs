//! Order dispatch engine
//!
//! Orders wait in [`OrderQueue`]s until their queue's [`DispatchFilter`]
//! lets them through, then an [`OrderProcessor`] takes ownership of them:
//! - stop orders are held per symbol by an [`OrderManager`] and promoted to
//!   the market queue when the price crosses their limit;
//! - market orders wait in the market queue until the market is open, then
//!   execute on the exchange.
//!
//! Queues come in three dispatch strategies (see [`QueueStrategy`]): on the
//! caller's thread, on a shared [`WorkerPool`], or on a dedicated thread.

pub mod comparator;
pub mod error;
pub mod filter;
pub mod manager;
pub mod pool;
pub mod processor;
pub mod queue;
pub mod types;

// Re-export core types
pub use comparator::{OrderComparator, PriorityKey};
pub use error::{DispatchError, DispatchResult};
pub use filter::{DispatchFilter, Threshold};
pub use manager::OrderManager;
pub use pool::{WorkerPool, DEFAULT_POOL_SIZE};
pub use processor::{OrderProcessor, TradeExecutor};
pub use queue::{OrderQueue, QueueStrategy};
pub use types::{next_order_id, AccountId, Order, OrderError, OrderId, OrderKind, MAX_QUANTITY};
