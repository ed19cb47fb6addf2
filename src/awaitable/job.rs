//! Kernel jobs and their completion handles
//!
//! Kernels run on a dedicated rayon pool. A [`JobHandle`] is a set of
//! completion signals; it can be polled without blocking or waited on.
//! A kernel is only scheduled once every buffer it reads is complete, so a
//! handle never depends on another handle.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use rayon::{ThreadPool, ThreadPoolBuilder};

use super::Awaitable;
use crate::core::{Error, Result};

/// Completion flag for one scheduled kernel
struct Signal {
    done: AtomicBool,
    lock: Mutex<bool>,
    cvar: Condvar,
}

impl Signal {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            lock: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn finish(&self) {
        let mut finished = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        *finished = true;
        self.done.store(true, Ordering::Release);
        self.cvar.notify_all();
    }

    fn wait(&self) {
        if self.is_done() {
            return;
        }
        let mut finished = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        while !*finished {
            finished = self.cvar.wait(finished).unwrap_or_else(|e| e.into_inner());
        }
    }
}

/// Handle to zero or more scheduled kernels
///
/// The default handle is already complete.
#[derive(Clone, Default)]
pub struct JobHandle {
    signals: Vec<Arc<Signal>>,
}

impl JobHandle {
    /// A handle with nothing to wait for
    pub fn completed() -> Self {
        Self::default()
    }

    pub fn is_completed(&self) -> bool {
        self.signals.iter().all(|s| s.is_done())
    }

    /// Block until every kernel behind this handle has finished
    pub fn complete(&self) {
        for signal in &self.signals {
            signal.wait();
        }
    }

    /// Merge several handles into one that completes when all of them do
    pub fn combine<'a>(handles: impl IntoIterator<Item = &'a JobHandle>) -> JobHandle {
        let signals = handles
            .into_iter()
            .flat_map(|h| h.signals.iter())
            .filter(|s| !s.is_done())
            .cloned()
            .collect();
        JobHandle { signals }
    }

    /// Number of kernels still running
    pub fn pending_count(&self) -> usize {
        self.signals.iter().filter(|s| !s.is_done()).count()
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("jobs", &self.signals.len())
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Awaitable for JobHandle {
    type Output = ();

    fn process_data(&mut self, _ctx: &mut ()) -> bool {
        self.is_completed()
    }

    fn result(&self) -> Option<&()> {
        if self.is_completed() { Some(&()) } else { None }
    }

    fn take_result(&mut self) -> Option<()> {
        if self.is_completed() { Some(()) } else { None }
    }
}

/// Dispatches kernels onto a dedicated worker pool
pub struct JobScheduler {
    pool: Arc<ThreadPool>,
    dispatched: u64,
}

impl JobScheduler {
    /// Create a scheduler with `worker_threads` workers (0 = one per core)
    pub fn new(worker_threads: usize) -> Result<Self> {
        let mut builder = ThreadPoolBuilder::new()
            .thread_name(|i| format!("terragraph-kernel-{}", i));
        if worker_threads > 0 {
            builder = builder.num_threads(worker_threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        log::info!("Kernel scheduler started with {} workers", pool.current_num_threads());

        Ok(Self {
            pool: Arc::new(pool),
            dispatched: 0,
        })
    }

    /// Run `kernel` on the worker pool.
    ///
    /// The kernel's captures are dropped before the returned handle reports
    /// completion, so any `Arc` it held is released by then.
    pub fn schedule<F>(&mut self, kernel: F) -> JobHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let signal = Arc::new(Signal::new());
        let done = Arc::clone(&signal);

        self.pool.spawn(move || {
            if panic::catch_unwind(AssertUnwindSafe(kernel)).is_err() {
                log::error!("Kernel panicked; its output buffer is left incomplete");
            }
            done.finish();
        });

        self.dispatched += 1;
        JobHandle { signals: vec![signal] }
    }

    /// Total kernels dispatched since creation
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}
