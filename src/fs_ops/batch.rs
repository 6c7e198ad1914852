//! Parallel batches.
//!
//! Every fan-out phase of a tree operation (one skeleton level, the file
//! transfer, the metadata seal) runs through [`WorkerPool::run`]:
//! - units run on a rayon pool sized from config (2x parallelism by default);
//! - the first failure is kept, later ones are only counted;
//! - once something failed no new unit starts, in-flight units finish;
//! - a shutdown request stops the batch like a failure would.

use anyhow::Result;
use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::TreeSyncError;
use crate::shutdown;

/// First failure of a batch plus how many other units also failed.
#[derive(Debug, Error)]
#[error("{first:#} ({suppressed} more failure(s) suppressed)")]
pub struct BatchError {
    pub first: anyhow::Error,
    pub suppressed: usize,
}

impl BatchError {
    /// Reduce to the first failure, logging the rest.
    pub fn into_first(self, phase: &str) -> anyhow::Error {
        if self.suppressed > 0 {
            warn!(phase, suppressed = self.suppressed, "additional failures suppressed");
        }
        self.first
    }
}

#[derive(Default)]
struct FailureSlot {
    first: Mutex<Option<anyhow::Error>>,
    failed: AtomicBool,
    suppressed: AtomicUsize,
}

impl FailureSlot {
    fn record(&self, err: anyhow::Error) {
        let mut slot = self.first.lock();
        if slot.is_none() {
            *slot = Some(err);
            self.failed.store(true, Ordering::Release);
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stopped(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn finish(self) -> Result<(), BatchError> {
        match self.first.into_inner() {
            None => Ok(()),
            Some(first) => Err(BatchError {
                first,
                suppressed: self.suppressed.into_inner(),
            }),
        }
    }
}

/// Bounded worker pool shared by the phases of one operation.
pub struct WorkerPool {
    pool: Option<ThreadPool>,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("treesync-worker-{i}"))
            .build();
        match pool {
            Ok(pool) => Self {
                pool: Some(pool),
                workers,
            },
            Err(e) => {
                warn!(workers, error = %e, "failed to build worker pool; using global pool");
                Self {
                    pool: None,
                    workers: rayon::current_num_threads(),
                }
            }
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.effective_workers())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over `items` in parallel and collect the first failure.
    pub fn try_run<T, F>(&self, phase: &str, items: Vec<T>, work: F) -> Result<(), BatchError>
    where
        T: Send,
        F: Fn(T) -> Result<()> + Sync + Send,
    {
        if items.is_empty() {
            return Ok(());
        }
        debug!(phase, units = items.len(), workers = self.workers, "batch start");
        let slot = FailureSlot::default();
        let body = || {
            items.into_par_iter().for_each(|item| {
                if slot.stopped() {
                    return;
                }
                if shutdown::is_requested() {
                    slot.record(TreeSyncError::Interrupted.into());
                    return;
                }
                if let Err(e) = work(item) {
                    slot.record(e);
                }
            })
        };
        match &self.pool {
            Some(pool) => pool.install(body),
            None => body(),
        }
        slot.finish()
    }

    /// Like [`try_run`](Self::try_run) but surfaces only the first failure.
    pub fn run<T, F>(&self, phase: &str, items: Vec<T>, work: F) -> Result<()>
    where
        T: Send,
        F: Fn(T) -> Result<()> + Sync + Send,
    {
        self.try_run(phase, items, work)
            .map_err(|e| e.into_first(phase))
    }
}
