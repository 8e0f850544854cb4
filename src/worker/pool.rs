//! Worker pool management.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error};

use crate::matcher::PrefixSet;

use super::cpu::{CpuWorker, WorkerStats};
use super::source::Candidate;

/// A candidate that matched at least one target when a worker checked it.
#[derive(Debug, Clone)]
pub struct WorkerHit {
    pub candidate: Candidate,
    /// The ID of the worker that found this candidate
    pub worker_id: usize,
}

/// Manages a pool of CPU workers for parallel key generation.
pub struct WorkerPool {
    num_workers: usize,
    /// Worker thread handles (Option to allow taking during join)
    handles: Option<Vec<JoinHandle<()>>>,
    result_rx: Receiver<WorkerHit>,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    start_time: Instant,
}

impl WorkerPool {
    /// Creates a pool of `num_workers` workers searching for `targets`.
    ///
    /// The search keeps the target set current; workers pick up changes at
    /// their next batch.
    pub fn new(num_workers: usize, targets: Arc<RwLock<PrefixSet>>) -> Self {
        let (result_tx, result_rx) = bounded(100);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(WorkerStats::new());

        let handles =
            Self::spawn_workers(num_workers, targets, result_tx, stop_flag.clone(), stats.clone());

        debug!(workers = handles.len(), "worker pool started");

        Self {
            num_workers: handles.len(),
            handles: Some(handles),
            result_rx,
            stop_flag,
            stats,
            start_time: Instant::now(),
        }
    }

    /// Spawns worker threads.
    ///
    /// A worker that cannot be spawned is logged and skipped; the pool runs
    /// with whatever threads it got.
    fn spawn_workers(
        num_workers: usize,
        targets: Arc<RwLock<PrefixSet>>,
        result_tx: Sender<WorkerHit>,
        stop_flag: Arc<AtomicBool>,
        stats: Arc<WorkerStats>,
    ) -> Vec<JoinHandle<()>> {
        (0..num_workers)
            .filter_map(|id| {
                let targets = targets.clone();
                let result_tx = result_tx.clone();
                let stop_flag = stop_flag.clone();
                let stats = stats.clone();

                thread::Builder::new()
                    .name(format!("vanity-worker-{}", id))
                    .spawn(move || {
                        let worker = CpuWorker::new(id, targets, result_tx, stop_flag, stats);
                        worker.run();
                    })
                    .map_err(|e| error!(worker = id, error = %e, "failed to spawn worker thread"))
                    .ok()
            })
            .collect()
    }

    /// Waits for a hit with timeout.
    ///
    /// Returns `Some(hit)` if a worker forwarded one, `None` if the timeout
    /// expires.
    pub fn wait_for_result(&self, timeout: Duration) -> Option<WorkerHit> {
        self.result_rx.recv_timeout(timeout).ok()
    }

    /// Attempts to receive a hit without blocking.
    pub fn try_recv(&self) -> Option<WorkerHit> {
        self.result_rx.try_recv().ok()
    }

    /// Signals all workers to stop.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    /// Stops the workers and waits for them to exit.
    pub fn join(mut self) {
        self.join_workers();
    }

    fn join_workers(&mut self) {
        self.stop();
        if let Some(handles) = self.handles.take() {
            for handle in handles {
                let _ = handle.join();
            }
        }
    }

    /// Returns the number of running workers.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Returns the total keys generated across all workers.
    pub fn total_keys(&self) -> u64 {
        self.stats.total_keys()
    }

    fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the current generation rate (keys per second).
    pub fn keys_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_keys() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.join_workers();
    }
}
