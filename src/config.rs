//! Command line configuration for the npub miner.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::store::DEFAULT_STORE_FILE;

/// Nostr vanity npub miner
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search for keys whose npub starts with the given prefixes
    Mine(MineArgs),
    /// Decrypt the store and print every found key
    Read(ReadArgs),
}

/// Where the encrypted store lives and how to unlock it.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Encrypted key store
    #[arg(long, env = "NOSTR_VANITY_STORE", default_value = DEFAULT_STORE_FILE)]
    pub store: PathBuf,

    /// Store password (prompted for when unset)
    #[arg(long, env = "NOSTR_VANITY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct MineArgs {
    /// Prefixes to search for, space or comma separated (prompted for when unset)
    #[arg(short, long)]
    pub prefixes: Option<String>,

    /// Time limit such as 30s, 5m or 2h; a bare number is minutes, 0 is unlimited
    #[arg(short, long)]
    pub time_limit: Option<String>,

    /// Number of worker threads (default: number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Progress report interval in seconds
    #[arg(short = 'r', long, default_value = "5")]
    pub report_interval: u64,

    /// Set an unreadable store aside instead of stopping
    #[arg(long, default_value = "false")]
    pub fresh: bool,

    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

impl MineArgs {
    /// Returns the number of workers, defaulting to CPU count
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval.max(1))
    }

    /// Validates the flags that do not need a prompt
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }
        if let Some(limit) = &self.time_limit {
            parse_time_limit(limit)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no valid prefixes given")]
    NoPrefixes,

    #[error("no password given")]
    EmptyPassword,

    #[error("invalid time limit \"{0}\" (try 30s, 5m or 2h)")]
    InvalidTimeLimit(String),

    #[error("worker count must be at least 1")]
    InvalidWorkers,
}

/// Parses a time limit.
///
/// Empty input and `0` mean no limit. A bare number is minutes; `s`, `m` and
/// `h` (and their longer spellings) select the unit.
pub fn parse_time_limit(input: &str) -> Result<Option<Duration>, ConfigError> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(None);
    }

    let invalid = || ConfigError::InvalidTimeLimit(input.trim().to_string());

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let amount: u64 = digits.parse().map_err(|_| invalid())?;

    let seconds_per_unit = match unit.trim_start() {
        "" | "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        _ => return Err(invalid()),
    };

    if amount == 0 {
        return Ok(None);
    }
    let seconds = amount.checked_mul(seconds_per_unit).ok_or_else(invalid)?;
    Ok(Some(Duration::from_secs(seconds)))
}

/// Renders a duration as `2h 5m`, `5m` or `30s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, mins) = (secs / 3600, (secs % 3600) / 60);
    if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else if mins > 0 {
        format!("{}m", mins)
    } else {
        format!("{}s", secs)
    }
}
