//! Depth-indexed worker pools.
//!
//! Exploration tasks block while waiting for their children, so a single
//! bounded pool could fill up with waiting parents and deadlock. Instead there
//! is one pool per depth budget: a node with budget `d` submits its children
//! to pool `d`, and every child has a strictly smaller budget. A worker of pool
//! `d` therefore only ever waits on work queued in pools below `d`, and pool 0
//! never waits at all. Oracle calls get their own pool and never wait on
//! exploration work.

use std::any::Any;
use std::sync::mpsc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::error;

use crate::error::ConfigError;
use crate::types::Depth;

/// The pool array plus the oracle pool.
pub struct PoolHierarchy {
    depth_pools: Vec<ThreadPool>,
    oracle_pool: ThreadPool,
}

impl PoolHierarchy {
    /// Builds `max_depth + 1` exploration pools with `concurrency` workers each
    /// and one oracle pool with `oracle_concurrency` workers.
    ///
    /// # Errors
    ///
    /// Returns an error if a size is zero, `max_depth` is negative, or the
    /// operating system refuses to start the threads.
    pub fn new(max_depth: Depth, concurrency: usize, oracle_concurrency: usize) -> Result<Self, ConfigError> {
        if max_depth < 0 {
            return Err(ConfigError::InvalidDepth {
                depth: max_depth,
                max: crate::types::MAX_DEPTH,
            });
        }
        if concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency { what: "concurrency" });
        }
        if oracle_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency {
                what: "oracle concurrency",
            });
        }

        let depth_pools = (0..=max_depth)
            .map(|depth| build_pool(concurrency, move |i| format!("explore-d{depth}-{i}")))
            .collect::<Result<Vec<_>, _>>()?;
        let oracle_pool = build_pool(oracle_concurrency, |i| format!("oracle-{i}"))?;

        Ok(PoolHierarchy {
            depth_pools,
            oracle_pool,
        })
    }

    /// Number of exploration pools.
    pub fn levels(&self) -> usize {
        self.depth_pools.len()
    }

    /// Runs `task` on the pool of depth `depth` without waiting for it.
    ///
    /// Depths beyond the hierarchy are clamped to the deepest pool.
    pub fn spawn_at<F>(&self, depth: Depth, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let index = (depth.max(0) as usize).min(self.depth_pools.len() - 1);
        self.depth_pools[index].spawn(task);
    }

    /// Runs `call` on the oracle pool and blocks until it returns.
    ///
    /// Returns `None` if the call panicked.
    pub fn run_oracle<T, F>(&self, call: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.oracle_pool.spawn(move || {
            let _ = tx.send(call());
        });
        rx.recv().ok()
    }
}

fn build_pool(threads: usize, name: impl Fn(usize) -> String + 'static) -> Result<ThreadPool, ConfigError> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(name)
        .panic_handler(log_panic)
        .build()
        .map_err(|err| ConfigError::Pool(err.to_string()))
}

fn log_panic(payload: Box<dyn Any + Send>) {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    error!(%message, "worker task panicked");
}
