//! CPU-based worker for vanity npub generation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender};
use tracing::warn;

use crate::matcher::PrefixSet;

use super::source::{KeySource, RandomKeySource};
use super::WorkerHit;

/// Keys generated between checks of the stop flag and the target set.
const BATCH_SIZE: u64 = 256;

/// How long a blocked send waits before rechecking the stop flag.
const SEND_RETRY: Duration = Duration::from_millis(50);

/// Statistics shared by all CPU workers.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Keys generated and encoded
    pub keys_generated: AtomicU64,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_keys(&self) -> u64 {
        self.keys_generated.load(Ordering::Relaxed)
    }
}

/// A CPU worker that generates keys and pre-matches them.
///
/// The worker only filters; the search re-checks every hit against its own
/// authoritative set before recording it.
pub struct CpuWorker {
    id: usize,
    /// Prefixes still wanted, republished by the search after each match
    targets: Arc<RwLock<PrefixSet>>,
    result_tx: Sender<WorkerHit>,
    stop_flag: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
}

impl CpuWorker {
    pub fn new(
        id: usize,
        targets: Arc<RwLock<PrefixSet>>,
        result_tx: Sender<WorkerHit>,
        stop_flag: Arc<AtomicBool>,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            id,
            targets,
            result_tx,
            stop_flag,
            stats,
        }
    }

    /// Runs the worker loop with random keys.
    pub fn run(&self) {
        self.run_with(&mut RandomKeySource::new());
    }

    /// Runs the worker loop until the stop flag is set, the target set is
    /// empty, or the result channel closes.
    pub fn run_with<S: KeySource + ?Sized>(&self, source: &mut S) {
        loop {
            if self.is_stopped() {
                break;
            }

            let targets = match self.targets.read() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            };
            if targets.is_empty() {
                break;
            }

            let mut generated = 0;
            for _ in 0..BATCH_SIZE {
                let candidate = match source.next_candidate() {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        warn!(worker = self.id, error = %e, "skipping key that failed to encode");
                        continue;
                    }
                };
                generated += 1;

                if !targets.matches(&candidate.npub).is_empty() {
                    let hit = WorkerHit {
                        candidate,
                        worker_id: self.id,
                    };
                    if !self.forward(hit) {
                        self.stats.keys_generated.fetch_add(generated, Ordering::Relaxed);
                        return;
                    }
                }
            }

            self.stats.keys_generated.fetch_add(generated, Ordering::Relaxed);
        }
    }

    /// Sends a hit, giving up only when stopped or disconnected.
    fn forward(&self, mut hit: WorkerHit) -> bool {
        loop {
            match self.result_tx.send_timeout(hit, SEND_RETRY) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => {
                    if self.is_stopped() {
                        return false;
                    }
                    hit = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    fn is_stopped(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CodecError, Keypair};
    use crate::matcher::Prefix;
    use crate::worker::Candidate;
    use crossbeam_channel::bounded;

    fn scripted(npubs: Vec<&'static str>) -> impl FnMut() -> Result<Candidate, CodecError> {
        let mut iter = npubs.into_iter().cycle();
        move || {
            Ok(Candidate {
                keypair: Keypair::generate(),
                npub: iter.next().unwrap_or_default().to_string(),
            })
        }
    }

    #[test]
    fn test_worker_forwards_hits_and_stops_when_targets_empty() {
        let targets = Arc::new(RwLock::new(PrefixSet::new([Prefix::validate("ac").unwrap()])));
        let (tx, rx) = bounded(1000);
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(WorkerStats::new());
        let worker = CpuWorker::new(3, targets.clone(), tx, stop, stats.clone());

        // empty the targets on the last key of the second batch so the loop ends
        let mut source = scripted(vec!["npub1xx", "npub1acd"]);
        let mut count = 0;
        let mut counting = || {
            count += 1;
            if count == 2 * BATCH_SIZE as usize {
                *targets.write().unwrap() = PrefixSet::default();
            }
            source()
        };
        worker.run_with(&mut counting);

        let hits: Vec<WorkerHit> = rx.try_iter().collect();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.worker_id == 3 && h.candidate.npub == "npub1acd"));
        assert_eq!(stats.total_keys(), 2 * BATCH_SIZE);
    }

    #[test]
    fn test_worker_counts_only_encoded_keys() {
        let targets = Arc::new(RwLock::new(PrefixSet::new([Prefix::validate("ac").unwrap()])));
        let (tx, _rx) = bounded(10);
        let stats = Arc::new(WorkerStats::new());
        let worker = CpuWorker::new(0, targets.clone(), tx, Arc::new(AtomicBool::new(false)), stats.clone());

        // every other key fails to encode
        let mut source = scripted(vec!["npub1qq"]);
        let mut count = 0;
        let mut flaky = || {
            count += 1;
            if count == 2 * BATCH_SIZE as usize {
                *targets.write().unwrap() = PrefixSet::default();
            }
            if count % 2 == 0 {
                Err(CodecError::Encode("boom".into()))
            } else {
                source()
            }
        };
        worker.run_with(&mut flaky);

        assert_eq!(stats.total_keys(), BATCH_SIZE);
    }

    #[test]
    fn test_worker_returns_when_stopped_on_full_channel() {
        let targets = Arc::new(RwLock::new(PrefixSet::new([Prefix::validate("ac").unwrap()])));
        let (tx, _rx) = bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(WorkerStats::new());
        let worker = CpuWorker::new(0, targets, tx, stop.clone(), stats.clone());

        let mut source = scripted(vec!["npub1ac"]);
        let mut count = 0;
        let mut stopping = || {
            count += 1;
            if count == 2 {
                stop.store(true, Ordering::Relaxed);
            }
            source()
        };
        // second send blocks on the full channel and gives up once stopped
        worker.run_with(&mut stopping);
        // the partial batch is still counted
        assert_eq!(stats.total_keys(), 2);
    }
}
