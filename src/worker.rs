use crate::config::WorkerConfig;
use crate::error::{GachaError, Result};
use log::{info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

const DEFAULT_STACK_SIZE: usize = 4 * 1024 * 1024;

/// Dedicated rayon pool for Monte-Carlo trials.
#[derive(Clone)]
pub struct SimWorker {
    pool: Arc<ThreadPool>,
    num_threads: usize,
}

impl SimWorker {
    /// `requested_threads == 0` leaves one core free on machines with more than two.
    pub fn new(requested_threads: usize) -> Result<Self> {
        let cores = available_cores();
        let num_threads = if requested_threads > 0 {
            requested_threads
        } else if cores > 2 {
            cores - 1
        } else {
            cores
        };
        Self::build_pool(num_threads, DEFAULT_STACK_SIZE)
    }

    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        let cores = available_cores();
        let mut num_threads = if cores > config.reserve_cores {
            cores - config.reserve_cores
        } else {
            1
        };
        if config.max_threads > 0 && num_threads > config.max_threads {
            num_threads = config.max_threads;
        }
        let stack_size = if config.stack_size_mb == 0 {
            DEFAULT_STACK_SIZE
        } else {
            config.stack_size_mb * 1024 * 1024
        };
        Self::build_pool(num_threads, stack_size)
    }

    fn build_pool(num_threads: usize, stack_size: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("wish-worker-{}", i))
            .stack_size(stack_size)
            .panic_handler(|err| {
                warn!("[Worker] thread panicked: {:?}", err);
            })
            .build()
            .map_err(|e| GachaError::Worker(e.to_string()))?;

        info!("[Worker] initialized with {} threads", num_threads);

        Ok(Self {
            pool: Arc::new(pool),
            num_threads,
        })
    }

    /// Runs `f` inside the pool; a panic in `f` comes back as `GachaError::Worker`.
    pub fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool
            .install(|| panic::catch_unwind(AssertUnwindSafe(f)))
            .map_err(|err| {
                let msg = if let Some(s) = err.downcast_ref::<&str>() {
                    format!("task panicked: {}", s)
                } else if let Some(s) = err.downcast_ref::<String>() {
                    format!("task panicked: {}", s)
                } else {
                    "task panicked with unknown payload".to_string()
                };
                GachaError::Worker(msg)
            })
    }

    pub fn thread_count(&self) -> usize {
        self.num_threads
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn explicit_thread_count_is_honoured() {
        let worker = SimWorker::new(2).unwrap();
        assert_eq!(worker.thread_count(), 2);
        let sum: u64 = worker
            .execute(|| (1..=100u64).into_par_iter().sum())
            .unwrap();
        assert_eq!(sum, 5050);
    }

    #[test]
    fn config_caps_threads() {
        let config = WorkerConfig {
            max_threads: 1,
            reserve_cores: 0,
            stack_size_mb: 0,
        };
        let worker = SimWorker::from_config(&config).unwrap();
        assert_eq!(worker.thread_count(), 1);
    }

    #[test]
    fn panics_become_errors() {
        let worker = SimWorker::new(1).unwrap();
        let res: Result<()> = worker.execute(|| panic!("boom"));
        match res {
            Err(GachaError::Worker(msg)) => assert!(msg.contains("boom")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
