//! Bounded task executor used to offload batched crypto work.
//!
//! Workers pull from one shared queue, so dispatch is first-available and
//! each worker runs at most one job at a time. A full or shut-down queue
//! hands the job back to the caller instead of blocking.

use crate::error::CryptoError;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Upper bound on the default worker count.
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Pending jobs allowed per worker before `submit` starts refusing work.
pub const QUEUE_SLOTS_PER_WORKER: usize = 64;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A job the executor refused, handed back so the caller can run it itself.
pub struct SubmitError {
    pub job: Job,
    pub reason: String,
}

impl std::fmt::Debug for SubmitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmitError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// Submit side of a bounded executor.
pub trait TaskExecutor: Send + Sync {
    fn submit(&self, job: Job) -> Result<(), SubmitError>;

    fn worker_count(&self) -> usize;
}

/// Point-in-time view of one worker's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: usize,
    pub busy: bool,
    pub tasks_completed: u64,
}

#[derive(Default)]
struct WorkerSlot {
    busy: AtomicBool,
    tasks_completed: AtomicU64,
}

pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    slots: Vec<Arc<WorkerSlot>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

static SHARED_POOL: OnceCell<Option<Arc<WorkerPool>>> = OnceCell::new();

impl WorkerPool {
    /// `min(available_parallelism, 8)`, never less than one.
    pub fn default_size() -> usize {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .clamp(1, MAX_DEFAULT_WORKERS)
    }

    pub fn new(size: usize) -> Result<Self, CryptoError> {
        let size = size.max(1);
        let (sender, receiver) = bounded::<Job>(size * QUEUE_SLOTS_PER_WORKER);

        let mut slots = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let slot = Arc::new(WorkerSlot::default());
            let handle = Self::spawn_worker(id, receiver.clone(), slot.clone())?;
            slots.push(slot);
            handles.push(handle);
        }
        debug!("Started crypto worker pool with {} workers", size);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            slots,
            handles: Mutex::new(handles),
        })
    }

    /// Process-wide pool, built on first use with [`WorkerPool::default_size`].
    /// `None` when the threads could not be spawned.
    pub fn shared() -> Option<Arc<WorkerPool>> {
        SHARED_POOL
            .get_or_init(|| match WorkerPool::new(Self::default_size()) {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    warn!("Shared crypto worker pool unavailable: {}", e);
                    None
                }
            })
            .clone()
    }

    fn spawn_worker(
        id: usize,
        receiver: Receiver<Job>,
        slot: Arc<WorkerSlot>,
    ) -> Result<JoinHandle<()>, CryptoError> {
        thread::Builder::new()
            .name(format!("crypto-worker-{}", id))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    slot.busy.store(true, Ordering::Release);
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
                    slot.busy.store(false, Ordering::Release);
                    slot.tasks_completed.fetch_add(1, Ordering::AcqRel);
                    if outcome.is_err() {
                        warn!("Crypto worker {} caught a panic while executing a task", id);
                    }
                }
            })
            .map_err(|e| {
                CryptoError::ExecutorUnavailable(format!("Failed to spawn worker {}: {}", id, e))
            })
    }

    pub fn stats(&self) -> Vec<WorkerStats> {
        self.slots
            .iter()
            .enumerate()
            .map(|(id, slot)| WorkerStats {
                id,
                busy: slot.busy.load(Ordering::Acquire),
                tasks_completed: slot.tasks_completed.load(Ordering::Acquire),
            })
            .collect()
    }

    pub fn total_completed(&self) -> u64 {
        self.stats().iter().map(|s| s.tasks_completed).sum()
    }

    /// Stops accepting work and waits for queued jobs to drain.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("Crypto worker exited abnormally during shutdown");
            }
        }
    }
}

impl TaskExecutor for WorkerPool {
    fn submit(&self, job: Job) -> Result<(), SubmitError> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(SubmitError {
                job,
                reason: "worker pool is shut down".to_string(),
            });
        };

        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => SubmitError {
                job,
                reason: "worker queue is full".to_string(),
            },
            TrySendError::Disconnected(job) => SubmitError {
                job,
                reason: "worker pool is shut down".to_string(),
            },
        })
    }

    fn worker_count(&self) -> usize {
        self.slots.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
