//! Nostr vanity npub miner CLI
//!
//! Usage:
//!   nostr-vanity mine -p ace,dev      # Search for npub1ace… and npub1dev…
//!   nostr-vanity mine -p ace -t 2h    # Give up after two hours
//!   nostr-vanity read                 # Print found keys as nsec

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

use nostr_vanity::config::{format_duration, parse_time_limit, MineArgs, ReadArgs, StoreArgs};
use nostr_vanity::crypto::BECH32_ALPHABET;
use nostr_vanity::matcher::unavailable_letters;
use nostr_vanity::{
    export_keys, parse_prefixes, Cli, Command, ConfigError, ExportError, KeyStore, PrefixSet,
    RandomKeySource, Search, SearchEvent, SearchLimits, StopReason, StoreError, Vault,
};

/// Exit status when the user stops a session before anything was found.
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Mine(args) => mine(args),
        Command::Read(args) => read(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn mine(args: MineArgs) -> Result<ExitCode> {
    args.validate()?;

    println!("Nostr Vanity npub Miner");
    println!("=======================");
    println!();

    let password = password(&args.store, "Encryption password: ")?;
    let requested = read_prefixes(&args)?;
    let time_limit = read_time_limit(&args)?;

    let vault = Vault::open(&args.store.store, &password)?;
    if vault.exists() {
        println!("\nLoading keys from {}", vault.path().display());
    }
    let store = open_store(&vault, args.fresh)?;

    if !store.is_empty() {
        println!("\nPreviously found:");
        for record in store.iter() {
            println!("  {}", record.npub());
        }
    }

    let limits = SearchLimits {
        time_limit,
        report_interval: args.report_interval(),
    };
    let mut search = Search::new(&requested, store, vault, limits);

    if search.remaining().is_empty() {
        println!("\nAll prefixes already found!");
        return Ok(ExitCode::SUCCESS);
    }

    let workers = args.worker_count();
    println!("\nSearching for: {}", search.remaining().display_list());
    println!("Difficulty:    {}", search.remaining().difficulty_description());
    println!("Workers:       {}", workers);
    match time_limit {
        Some(limit) => println!("Time limit:    {}", format_duration(limit)),
        None => println!("Time limit:    none"),
    }
    println!();
    println!("Press Ctrl+C anytime to stop and save found keys.");
    println!("Keys are saved to: {}", args.store.store.display());
    println!("To read your keys later, run: nostr-vanity read");
    println!();

    let stop_flag = search.stop_handle();
    ctrlc::set_handler(move || {
        stop_flag.store(true, Ordering::Relaxed);
    })
    .context("failed to set Ctrl-C handler")?;

    let on_event = |event: SearchEvent<'_>| print_event(event, time_limit);
    let outcome = if workers <= 1 {
        search.run_with(&mut RandomKeySource::new(), on_event)?
    } else {
        search.run_parallel(workers, on_event)?
    };

    println!();
    match outcome.reason {
        StopReason::Completed => println!("All prefixes found!"),
        StopReason::TimeLimit => println!("Time limit reached ({}).", format_duration(outcome.elapsed)),
        StopReason::Interrupted => println!("Stopped by user."),
    }

    println!("\n--- Final Statistics ---");
    println!("Total keys generated: {}", format_number(outcome.attempts));
    println!("Keys found:           {}", outcome.found_this_session);
    println!("Workers used:         {}", outcome.workers);
    println!("Time elapsed:         {:.2}s", outcome.elapsed.as_secs_f64());
    println!(
        "Average speed:        {}/s",
        format_number(rate(outcome.attempts, outcome.elapsed) as u64)
    );

    let store = search.into_store();
    if store.is_empty() {
        println!("\nNo keys found this session.");
        if outcome.reason == StopReason::Interrupted {
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("\nFound npubs:");
    for record in store.iter() {
        println!("  {}", record.npub());
    }
    println!("\nKeys saved to {}", args.store.store.display());
    println!("Run \"nostr-vanity read\" and enter your password to view them.");

    Ok(ExitCode::SUCCESS)
}

fn read(args: ReadArgs) -> Result<ExitCode> {
    let path = &args.store.store;
    if !path.exists() {
        bail!(
            "no key store found at {}. Run \"nostr-vanity mine\" first",
            path.display()
        );
    }

    println!("Reading keys from: {}\n", path.display());
    let password = password(&args.store, "Password: ")?;
    let vault = Vault::open(path, &password)?;

    let keys = match export_keys(&vault) {
        Ok(keys) => keys,
        Err(ExportError::Store(e)) if e.is_wrong_password() => bail!("wrong password"),
        Err(e) => return Err(e).context("failed to read key store"),
    };

    if keys.is_empty() {
        println!("No keys found.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} key(s) found:\n", keys.len());
    for key in &keys {
        println!("--- {} ---", key.prefix);
        println!("  npub:  {}", key.npub);
        println!("  nsec:  {}", key.nsec.as_str());
        println!("  found: {}", key.found_at.to_rfc3339());
        println!();
    }

    Ok(ExitCode::SUCCESS)
}

/// Loads the store, setting an unreadable one aside when `fresh` is set.
fn open_store(vault: &Vault, fresh: bool) -> Result<KeyStore> {
    match vault.load() {
        Ok(store) => Ok(store),
        Err(
            e @ (StoreError::WrongPasswordOrCorruptData
            | StoreError::MalformedFile(_)
            | StoreError::MalformedPayload(_)),
        ) => {
            if !fresh {
                return Err(e).with_context(|| {
                    format!(
                        "cannot open {}. Use the password it was created with, or pass \
                         --fresh to set it aside and start a new store",
                        vault.path().display()
                    )
                });
            }
            let backup = vault.set_aside()?;
            println!("Existing store moved to {}", backup.display());
            Ok(KeyStore::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn password(args: &StoreArgs, question: &str) -> Result<Zeroizing<String>> {
    let password = match &args.password {
        Some(password) => Zeroizing::new(password.clone()),
        None => Zeroizing::new(rpassword::prompt_password(question).context("failed to read password")?),
    };
    if password.is_empty() {
        bail!(ConfigError::EmptyPassword);
    }
    Ok(password)
}

fn read_prefixes(args: &MineArgs) -> Result<PrefixSet> {
    let input = match &args.prefixes {
        Some(prefixes) => prefixes.clone(),
        None => {
            let unavailable: String = unavailable_letters().into_iter().collect();
            println!("\nValid bech32 chars: {}", BECH32_ALPHABET);
            println!("(characters not available: {})\n", unavailable);
            prompt("Vanity prefixes (space or comma separated): ")?
        }
    };

    let parsed = parse_prefixes(&input);
    for rejected in &parsed.rejected {
        println!("Skipping {}", rejected);
    }
    if parsed.valid.is_empty() {
        bail!(ConfigError::NoPrefixes);
    }

    let requested: PrefixSet = parsed.valid.into_iter().collect();
    println!("\nWill search for: {}", requested.display_list());
    Ok(requested)
}

fn read_time_limit(args: &MineArgs) -> Result<Option<Duration>> {
    let input = match &args.time_limit {
        Some(limit) => limit.clone(),
        None => prompt("\nTime limit (e.g. 30m, 2h, or press Enter for unlimited): ")?,
    };
    Ok(parse_time_limit(&input)?)
}

fn prompt(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    Ok(line.trim().to_string())
}

fn print_event(event: SearchEvent<'_>, time_limit: Option<Duration>) {
    match event {
        SearchEvent::Found { record, remaining } => {
            println!("\nFOUND: {}", record.npub());
            if !remaining.is_empty() {
                println!("Still searching for: {}", remaining.display_list());
            }
        }
        SearchEvent::Progress {
            attempts,
            elapsed,
            keys_per_second,
        } => {
            let timing = match time_limit {
                Some(limit) => format!("{} remaining", format_duration(limit.saturating_sub(elapsed))),
                None => format!("{} elapsed", format_duration(elapsed)),
            };
            println!(
                "[{:>4}s] Generated {} keys ({}/s), {}",
                elapsed.as_secs(),
                format_number(attempts),
                format_number(keys_per_second as u64),
                timing
            );
        }
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

fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}
