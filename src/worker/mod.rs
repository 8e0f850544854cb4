//! Key generation workers.
//!
//! This module provides:
//! - Key sources (random, or any closure for scripted runs)
//! - Multi-threaded CPU workers that pre-filter candidates
//! - A worker pool forwarding hits to a single consumer

mod cpu;
mod pool;
mod source;

pub use cpu::{CpuWorker, WorkerStats};
pub use pool::{WorkerHit, WorkerPool};
pub use source::{Candidate, KeySource, RandomKeySource};
