//! The search loop: generate, match, persist.
//!
//! [`Search`] owns the set of prefixes still wanted, the key store and the
//! vault it is saved to. It is the only writer of the store file, so flushes
//! happen one at a time and in order, whether keys come from a single
//! in-thread source or from a pool of workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::matcher::PrefixSet;
use crate::store::{FoundRecord, KeyStore, StoreError, Vault};
use crate::worker::{Candidate, KeySource, WorkerPool};

/// How often the parallel loop wakes to check the stop flag and time budget.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every requested prefix has a key
    Completed,
    /// The time budget ran out
    TimeLimit,
    /// The stop flag was raised (Ctrl-C)
    Interrupted,
}

/// Limits and cadence for a search.
#[derive(Debug, Clone, Copy)]
pub struct SearchLimits {
    /// Wall-clock budget; `None` or zero runs until done or interrupted
    pub time_limit: Option<Duration>,
    /// Interval between progress events
    pub report_interval: Duration,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            time_limit: None,
            report_interval: Duration::from_secs(5),
        }
    }
}

/// Events emitted while the search runs.
#[derive(Debug)]
pub enum SearchEvent<'a> {
    /// A prefix was matched and the store saved
    Found {
        record: &'a FoundRecord,
        remaining: &'a PrefixSet,
    },
    /// Periodic progress
    Progress {
        attempts: u64,
        elapsed: Duration,
        keys_per_second: f64,
    },
}

/// Summary of a finished search.
#[derive(Debug, Clone, Copy)]
pub struct SearchOutcome {
    pub reason: StopReason,
    pub attempts: u64,
    pub elapsed: Duration,
    /// Records added during this run (not counting loaded ones)
    pub found_this_session: usize,
    /// Threads that generated keys
    pub workers: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// A found key could not be saved. The search stops rather than risk
    /// losing it.
    #[error("failed to save found key: {0}")]
    Persistence(#[source] StoreError),
}

/// A resumable vanity search.
pub struct Search {
    remaining: PrefixSet,
    store: KeyStore,
    vault: Vault,
    limits: SearchLimits,
    stop_flag: Arc<AtomicBool>,
    attempts: u64,
    found_this_session: usize,
}

impl Search {
    /// Creates a search for `requested`, skipping prefixes already in `store`.
    pub fn new(requested: &PrefixSet, store: KeyStore, vault: Vault, mut limits: SearchLimits) -> Self {
        limits.time_limit = limits.time_limit.filter(|limit| !limit.is_zero());

        let remaining = requested
            .iter()
            .filter(|p| !store.contains(p))
            .cloned()
            .collect();

        Self {
            remaining,
            store,
            vault,
            limits,
            stop_flag: Arc::new(AtomicBool::new(false)),
            attempts: 0,
            found_this_session: 0,
        }
    }

    /// Flag that stops the search at the next iteration boundary.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    pub fn remaining(&self) -> &PrefixSet {
        &self.remaining
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    pub fn into_store(self) -> KeyStore {
        self.store
    }

    /// Runs the search on the calling thread, one candidate per iteration.
    ///
    /// The stop flag and time budget are checked before every iteration. A
    /// candidate that fails to generate is logged and skipped.
    pub fn run_with<S, F>(&mut self, source: &mut S, mut on_event: F) -> Result<SearchOutcome, SearchError>
    where
        S: KeySource + ?Sized,
        F: FnMut(SearchEvent<'_>),
    {
        let started = Instant::now();
        let mut last_report = started;
        let first_attempt = self.attempts;
        info!(targets = %self.remaining.display_list(), "search started");

        let result = loop {
            if let Some(reason) = self.check_stop(started) {
                break Ok(reason);
            }

            self.attempts += 1;
            match source.next_candidate() {
                Ok(candidate) => {
                    if let Err(e) = self.record(&candidate, &mut on_event) {
                        break Err(e);
                    }
                }
                Err(e) => warn!(error = %e, "skipping key that failed to encode"),
            }

            if last_report.elapsed() >= self.limits.report_interval {
                last_report = Instant::now();
                let elapsed = started.elapsed();
                let attempts = self.attempts - first_attempt;
                on_event(SearchEvent::Progress {
                    attempts,
                    elapsed,
                    keys_per_second: rate(attempts, elapsed),
                });
            }
        };

        let attempts = self.attempts - first_attempt;
        self.finish(result, started, attempts, 1)
    }

    /// Runs the search on `num_workers` threads.
    ///
    /// Workers only generate and pre-filter; every hit comes back here to be
    /// re-checked, recorded and saved.
    pub fn run_parallel<F>(&mut self, num_workers: usize, mut on_event: F) -> Result<SearchOutcome, SearchError>
    where
        F: FnMut(SearchEvent<'_>),
    {
        let started = Instant::now();
        if self.remaining.is_empty() {
            return self.finish(Ok(StopReason::Completed), started, 0, 0);
        }

        let targets = Arc::new(RwLock::new(self.remaining.clone()));
        let pool = WorkerPool::new(num_workers.max(1), targets.clone());
        let workers = pool.num_workers();
        info!(targets = %self.remaining.display_list(), workers, "search started");
        let mut last_report = started;

        let mut result = loop {
            if let Some(reason) = self.check_stop(started) {
                break Ok(reason);
            }

            if let Some(hit) = pool.wait_for_result(POLL_INTERVAL) {
                debug!(worker = hit.worker_id, "worker reported a hit");
                if let Err(e) = self.record(&hit.candidate, &mut on_event) {
                    break Err(e);
                }
                self.publish_targets(&targets);
            }

            if last_report.elapsed() >= self.limits.report_interval {
                last_report = Instant::now();
                on_event(SearchEvent::Progress {
                    attempts: pool.total_keys(),
                    elapsed: started.elapsed(),
                    keys_per_second: pool.keys_per_second(),
                });
            }
        };

        // hits already queued were found before the stop; keep them
        pool.stop();
        if result.is_ok() {
            while let Some(hit) = pool.try_recv() {
                if let Err(e) = self.record(&hit.candidate, &mut on_event) {
                    result = Err(e);
                    break;
                }
            }
        }

        let attempts = pool.total_keys();
        self.attempts += attempts;
        pool.join();

        self.finish(result, started, attempts, workers)
    }

    fn check_stop(&self, started: Instant) -> Option<StopReason> {
        if self.remaining.is_empty() {
            return Some(StopReason::Completed);
        }
        if self.stop_flag.load(Ordering::Relaxed) {
            return Some(StopReason::Interrupted);
        }
        match self.limits.time_limit {
            Some(limit) if started.elapsed() >= limit => Some(StopReason::TimeLimit),
            _ => None,
        }
    }

    /// Records every remaining prefix `candidate` satisfies and saves the
    /// store before reporting them.
    fn record<F>(&mut self, candidate: &Candidate, on_event: &mut F) -> Result<(), SearchError>
    where
        F: FnMut(SearchEvent<'_>),
    {
        let matched = self.remaining.matches(&candidate.npub);
        if matched.is_empty() {
            return Ok(());
        }

        let found_at = Utc::now();
        for prefix in &matched {
            self.remaining.remove(prefix);
            let record = FoundRecord::new(
                prefix.clone(),
                &candidate.keypair,
                candidate.npub.clone(),
                found_at,
            );
            if self.store.insert(record) {
                self.found_this_session += 1;
            }
        }

        self.vault.save(&self.store).map_err(SearchError::Persistence)?;
        info!(npub = %candidate.npub, matched = matched.len(), "found matching key");

        for prefix in &matched {
            if let Some(record) = self.store.get(prefix) {
                on_event(SearchEvent::Found {
                    record,
                    remaining: &self.remaining,
                });
            }
        }
        Ok(())
    }

    fn publish_targets(&self, targets: &RwLock<PrefixSet>) {
        match targets.write() {
            Ok(mut guard) => *guard = self.remaining.clone(),
            Err(poisoned) => *poisoned.into_inner() = self.remaining.clone(),
        }
    }

    /// Final flush shared by every exit path.
    fn finish(
        &mut self,
        result: Result<StopReason, SearchError>,
        started: Instant,
        attempts: u64,
        workers: usize,
    ) -> Result<SearchOutcome, SearchError> {
        let reason = result?;

        if !self.store.is_empty() {
            self.vault.save(&self.store).map_err(SearchError::Persistence)?;
        }

        let elapsed = started.elapsed();
        info!(?reason, attempts, found = self.found_this_session, "search finished");

        Ok(SearchOutcome {
            reason,
            attempts,
            elapsed,
            found_this_session: self.found_this_session,
            workers,
        })
    }
}

fn rate(attempts: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        attempts as f64 / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CodecError, Keypair};
    use crate::matcher::Prefix;
    use crate::store::KdfParams;
    use tempfile::tempdir;

    const TEST_PARAMS: KdfParams = KdfParams::new(4, 8, 1);

    fn prefixes(list: &[&str]) -> PrefixSet {
        list.iter().map(|p| Prefix::validate(p).unwrap()).collect()
    }

    fn candidate(npub: &str) -> Candidate {
        Candidate {
            keypair: Keypair::generate(),
            npub: npub.to_string(),
        }
    }

    #[test]
    fn test_overlapping_prefixes_recorded_in_one_iteration() {
        let dir = tempdir().unwrap();
        let vault = Vault::with_params(dir.path().join("k.enc"), "pw", &TEST_PARAMS).unwrap();
        let mut search = Search::new(&prefixes(&["ac", "acd"]), KeyStore::new(), vault, SearchLimits::default());

        let mut source = || Ok::<_, CodecError>(candidate("npub1acddef"));
        let mut found = Vec::new();
        let outcome = search
            .run_with(&mut source, |event| {
                if let SearchEvent::Found { record, .. } = event {
                    found.push(record.prefix().to_string());
                }
            })
            .unwrap();

        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(found, vec!["ac", "acd"]);
        let store = search.store();
        assert_eq!(
            store.get(&Prefix::validate("ac").unwrap()).unwrap().npub(),
            store.get(&Prefix::validate("acd").unwrap()).unwrap().npub()
        );
    }

    #[test]
    fn test_loaded_prefixes_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("k.enc");
        let vault = Vault::with_params(&path, "pw", &TEST_PARAMS).unwrap();

        let mut store = KeyStore::new();
        let keypair = Keypair::generate();
        store.insert(FoundRecord::new(
            Prefix::validate("ac").unwrap(),
            &keypair,
            "npub1ac",
            Utc::now(),
        ));

        let search = Search::new(&prefixes(&["ac", "cd"]), store, vault, SearchLimits::default());
        assert_eq!(search.remaining(), &prefixes(&["cd"]));
    }

    #[test]
    fn test_nothing_left_completes_immediately() {
        let dir = tempdir().unwrap();
        let vault = Vault::with_params(dir.path().join("k.enc"), "pw", &TEST_PARAMS).unwrap();
        let mut search = Search::new(&PrefixSet::default(), KeyStore::new(), vault, SearchLimits::default());

        let outcome = search.run_parallel(2, |_| {}).unwrap();
        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.attempts, 0);
        // nothing found, nothing written
        assert!(!dir.path().join("k.enc").exists());
    }

    #[test]
    fn test_encoding_errors_are_skipped() {
        let dir = tempdir().unwrap();
        let vault = Vault::with_params(dir.path().join("k.enc"), "pw", &TEST_PARAMS).unwrap();
        let mut search = Search::new(&prefixes(&["ac"]), KeyStore::new(), vault, SearchLimits::default());

        let mut calls = 0;
        let mut source = || {
            calls += 1;
            if calls < 3 {
                Err(CodecError::Encode("boom".into()))
            } else {
                Ok(candidate("npub1ac"))
            }
        };
        let outcome = search.run_with(&mut source, |_| {}).unwrap();
        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_save_failure_aborts() {
        let dir = tempdir().unwrap();
        // parent directory does not exist, so every save fails
        let vault = Vault::with_params(dir.path().join("missing/k.enc"), "pw", &TEST_PARAMS).unwrap();
        let mut search = Search::new(&prefixes(&["ac", "cd"]), KeyStore::new(), vault, SearchLimits::default());

        let mut source = || Ok::<_, CodecError>(candidate("npub1ac"));
        let err = search.run_with(&mut source, |_| {}).unwrap_err();
        assert!(matches!(err, SearchError::Persistence(StoreError::Persistence { .. })));
    }

    #[test]
    fn test_parallel_finds_easy_prefixes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("k.enc");
        let vault = Vault::with_params(&path, "pw", &TEST_PARAMS).unwrap();
        let limits = SearchLimits {
            time_limit: Some(Duration::from_secs(60)),
            ..SearchLimits::default()
        };
        let mut search = Search::new(&prefixes(&["q", "p"]), KeyStore::new(), vault, limits);

        let outcome = search.run_parallel(2, |_| {}).unwrap();
        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.found_this_session, 2);

        let reloaded = Vault::with_params(&path, "pw", &TEST_PARAMS)
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(&reloaded, search.store());
        for record in reloaded.iter() {
            assert!(record.prefix().is_match(record.npub()));
        }
    }

    #[test]
    fn test_zero_time_limit_is_unlimited() {
        let dir = tempdir().unwrap();
        let vault = Vault::with_params(dir.path().join("k.enc"), "pw", &TEST_PARAMS).unwrap();
        let limits = SearchLimits {
            time_limit: Some(Duration::ZERO),
            ..SearchLimits::default()
        };
        let mut search = Search::new(&prefixes(&["ac"]), KeyStore::new(), vault, limits);

        let mut calls = 0;
        let mut source = || {
            calls += 1;
            let npub = if calls == 10 { "npub1ac" } else { "npub1qq" };
            Ok::<_, CodecError>(candidate(npub))
        };
        let outcome = search.run_with(&mut source, |_| {}).unwrap();
        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.attempts, 10);
        assert_eq!(outcome.workers, 1);
    }

    /// A store that already holds one record, so every exit path has
    /// something to flush.
    fn seeded(path: &std::path::Path) -> (Vault, KeyStore) {
        let vault = Vault::with_params(path, "pw", &TEST_PARAMS).unwrap();
        let keypair = Keypair::generate();
        let mut store = KeyStore::new();
        store.insert(FoundRecord::new(
            Prefix::validate("ace").unwrap(),
            &keypair,
            keypair.npub().unwrap(),
            Utc::now(),
        ));
        (vault, store)
    }

    #[test]
    fn test_parallel_stop_flag_flushes_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("k.enc");
        let (vault, store) = seeded(&path);
        let requested = prefixes(&["ace", "qqqqqqqqqqqq"]);
        let mut search = Search::new(&requested, store, vault, SearchLimits::default());

        let stop = search.stop_handle();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            stop.store(true, Ordering::Relaxed);
        });
        let outcome = search.run_parallel(2, |_| {}).unwrap();
        stopper.join().unwrap();

        assert_eq!(outcome.reason, StopReason::Interrupted);
        assert_eq!(outcome.workers, 2);
        assert!(outcome.attempts > 0);
        assert_eq!(outcome.found_this_session, 0);

        let reloaded = Vault::with_params(&path, "pw", &TEST_PARAMS)
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(&reloaded, search.store());
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn test_parallel_time_limit_flushes_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("k.enc");
        let (vault, store) = seeded(&path);
        let limits = SearchLimits {
            time_limit: Some(Duration::from_millis(300)),
            ..SearchLimits::default()
        };
        let mut search = Search::new(&prefixes(&["qqqqqqqqqqqq"]), store, vault, limits);

        let outcome = search.run_parallel(2, |_| {}).unwrap();
        assert_eq!(outcome.reason, StopReason::TimeLimit);
        assert!(outcome.elapsed >= Duration::from_millis(300));

        let reloaded = Vault::with_params(&path, "pw", &TEST_PARAMS)
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(&reloaded, search.store());
    }

    #[test]
    fn test_parallel_keeps_hits_queued_before_stop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("k.enc");
        let vault = Vault::with_params(&path, "pw", &TEST_PARAMS).unwrap();
        let mut search = Search::new(&prefixes(&["q", "p", "z"]), KeyStore::new(), vault, SearchLimits::default());

        // stop as soon as the first key is reported; hits already queued still count
        let stop = search.stop_handle();
        let mut found = 0;
        let outcome = search
            .run_parallel(4, |event| {
                if let SearchEvent::Found { .. } = event {
                    found += 1;
                    stop.store(true, Ordering::Relaxed);
                }
            })
            .unwrap();

        assert!(found >= 1);
        assert_eq!(outcome.found_this_session, found);
        assert_eq!(search.remaining().len(), 3 - found);

        let reloaded = Vault::with_params(&path, "pw", &TEST_PARAMS)
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(reloaded.len(), found);
        assert_eq!(&reloaded, search.store());
    }
}
