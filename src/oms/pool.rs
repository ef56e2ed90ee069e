//! Bounded worker pool shared by pooled order queues
//!
//! Thin wrapper over a rayon thread pool that adds a shutdown state (tasks
//! submitted after shutdown are rejected) and in-flight tracking so shutdown
//! can wait, with a deadline, for running drain tasks to finish.

use parking_lot::{Condvar, Mutex, RwLock};
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::error::{DispatchError, DispatchResult};

/// Default number of worker threads
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Cloneable handle to a fixed-size worker pool
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    name: String,
    size: usize,
    pool: RwLock<Option<rayon::ThreadPool>>,
    in_flight: Mutex<usize>,
    idle: Condvar,
}

/// Decrements the in-flight count even if the task panics
struct TaskGuard(Arc<PoolInner>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut count = self.0.in_flight.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

impl WorkerPool {
    /// Build a pool with `size` worker threads named `{name}-worker-{i}`
    pub fn new(name: impl Into<String>, size: usize) -> DispatchResult<Self> {
        let name = name.into();
        let size = size.max(1);
        let thread_prefix = name.clone();
        let handler_name = name.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(move |i| format!("{}-worker-{}", thread_prefix, i))
            .panic_handler(move |payload| {
                error!(
                    pool = %handler_name,
                    panic = panic_message(payload.as_ref()),
                    "Worker task panicked"
                );
            })
            .build()?;

        info!(pool = %name, size, "Worker pool started");

        Ok(Self {
            inner: Arc::new(PoolInner {
                name,
                size,
                pool: RwLock::new(Some(pool)),
                in_flight: Mutex::new(0),
                idle: Condvar::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Number of submitted tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.lock()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.pool.read().is_none()
    }

    /// Submit a task. Fails with [`DispatchError::PoolShutdown`] once the pool is shut down.
    pub fn execute<F>(&self, task: F) -> DispatchResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.inner.pool.read();
        let pool = guard.as_ref().ok_or(DispatchError::PoolShutdown)?;

        *self.inner.in_flight.lock() += 1;
        let tracker = TaskGuard(Arc::clone(&self.inner));
        pool.spawn(move || {
            let _tracker = tracker;
            task();
        });
        Ok(())
    }

    /// Stop accepting tasks and wait up to `timeout` for running tasks to finish.
    ///
    /// Returns `true` if the pool went idle before the deadline.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let Some(pool) = self.inner.pool.write().take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        let mut count = self.inner.in_flight.lock();
        while *count > 0 {
            if self.inner.idle.wait_until(&mut count, deadline).timed_out() {
                break;
            }
        }
        let remaining = *count;
        drop(count);
        // Dropping the rayon pool lets its threads exit once queued jobs finish
        drop(pool);

        if remaining > 0 {
            warn!(
                pool = %self.inner.name,
                remaining,
                "Worker pool shutdown timed out with tasks still running"
            );
            false
        } else {
            debug!(pool = %self.inner.name, "Worker pool shut down");
            true
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.name)
            .field("size", &self.inner.size)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_executes_tasks_and_drains_on_shutdown() {
        let pool = WorkerPool::new("test", 2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        assert!(pool.shutdown(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let pool = WorkerPool::new("test", 1).unwrap();
        assert!(pool.shutdown(Duration::from_millis(100)));
        assert!(pool.is_shutdown());
        assert!(matches!(pool.execute(|| {}), Err(DispatchError::PoolShutdown)));
        // Second shutdown is a no-op
        assert!(pool.shutdown(Duration::from_millis(100)));
    }

    #[test]
    fn test_shutdown_times_out_on_slow_task() {
        let pool = WorkerPool::new("test", 1).unwrap();
        pool.execute(|| std::thread::sleep(Duration::from_millis(300)))
            .unwrap();
        // Give the worker a moment to pick the task up
        std::thread::sleep(Duration::from_millis(20));
        assert!(!pool.shutdown(Duration::from_millis(10)));
    }

    #[test]
    fn test_panicking_task_does_not_abort() {
        let pool = WorkerPool::new("test", 1).unwrap();
        pool.execute(|| panic!("task failure")).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let after = Arc::clone(&counter);
        pool.execute(move || {
            after.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(pool.shutdown(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_panic_message_text() {
        let payload: Box<dyn Any + Send> = Box::new("static text");
        assert_eq!(panic_message(payload.as_ref()), "static text");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned text"));
        assert_eq!(panic_message(payload.as_ref()), "owned text");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let pool = WorkerPool::new("test", 0).unwrap();
        assert_eq!(pool.size(), 1);
        pool.shutdown(Duration::from_millis(100));
    }
}
