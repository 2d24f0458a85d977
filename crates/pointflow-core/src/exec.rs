//! Process-wide worker pool.
//!
//! One fixed-size pool executes every submitted unit of work: per-view
//! stage runners here in the engine, and batch jobs (file or metadata
//! gathering) in the kernels built on top. Callers submit and then block on
//! completion; there is no cooperative suspension, no cancellation, and no
//! retry. The pool is sized once at startup from `POINTFLOW_THREADS`
//! (falling back to the logical CPU count) and lives for the process.

use std::sync::OnceLock;

static GLOBAL: OnceLock<ExecPool> = OnceLock::new();

/// Environment variable controlling the global pool size.
pub const THREADS_ENV: &str = "POINTFLOW_THREADS";

/// A fixed-size worker pool for blocking fan-out/join execution.
pub struct ExecPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl ExecPool {
    /// Returns the process-wide pool, building it on first use.
    pub fn global() -> &'static ExecPool {
        GLOBAL.get_or_init(|| {
            let threads = std::env::var(THREADS_ENV)
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or_else(num_cpus::get);
            tracing::debug!(threads, "building global worker pool");
            Self::with_threads(threads)
        })
    }

    /// Builds a pool with an explicit thread count.
    ///
    /// # Panics
    ///
    /// Panics when the operating system refuses to spawn worker threads;
    /// there is no useful degraded mode without a pool.
    #[must_use]
    pub fn with_threads(threads: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("pointflow-worker-{i}"))
            .panic_handler(|payload| {
                let msg = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .map(String::from)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(panic = %msg, "worker thread panicked");
            })
            .build()
            .expect("failed to build worker pool");
        Self { pool, threads }
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Runs a scoped fan-out on the pool, blocking until every unit spawned
    /// inside the scope has completed.
    pub fn scope<'scope, F, R>(&self, f: F) -> R
    where
        F: FnOnce(&rayon::Scope<'scope>) -> R + Send,
        R: Send,
    {
        self.pool.scope(f)
    }
}

impl std::fmt::Debug for ExecPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecPool")
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_scope_joins_all_units() {
        let pool = ExecPool::with_threads(4);
        let counter = AtomicUsize::new(0);
        pool.scope(|s| {
            for _ in 0..32 {
                s.spawn(|_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_global_pool_is_shared() {
        let a = ExecPool::global() as *const _;
        let b = ExecPool::global() as *const _;
        assert_eq!(a, b);
        assert!(ExecPool::global().threads() >= 1);
    }
}
