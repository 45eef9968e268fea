//! hostcore command-line entry point.
//!
//! Reports the clock calibration of this host and drives the sharded store
//! with a multi-threaded GET/SET load.

mod bench;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hostcore_clock::calibration::{self, Calibrator, ClockCalibration};
use hostcore_clock::monotonic::{self, NativeClock, SystemClock};
use hostcore_clock::{cpuwide_time_ns, monotonic_time_ns, read_cycle_counter};
use hostcore_common::config::{ClockStrategy, CoreConfig};
use hostcore_common::error::CoreError;
use hostcore_kv::ShardedStore;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// hostcore command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "hostcore",
    about = "Monotonic clock calibration and sharded key-value store tools",
    version,
    long_about = None
)]
struct Args {
    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the CPU frequency calibration and current clock readings.
    Clock {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Run a GET/SET load against an in-process sharded store.
    Bench {
        /// Worker threads (overrides config file).
        #[arg(long, short = 't')]
        threads: Option<usize>,

        /// Run time, e.g. `2s` or `500ms` (overrides config file).
        #[arg(long, short = 'd')]
        duration: Option<humantime::Duration>,

        /// Distinct keys (overrides config file).
        #[arg(long, short = 'k')]
        keys: Option<usize>,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so reports on stdout stay machine readable
    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting hostcore");

    let mut config = load_config(&args)?;
    install_clock(&config)?;

    match args.command {
        Command::Clock { json } => print_clock(json),
        Command::Bench {
            threads,
            duration,
            keys,
            json,
        } => {
            if let Some(threads) = threads {
                config.bench.threads = threads;
            }
            if let Some(duration) = duration {
                config.bench.duration = duration.into();
            }
            if let Some(keys) = keys {
                config.bench.key_space = keys;
            }

            let store =
                ShardedStore::from_config(&config.store).context("Failed to create store")?;
            let report = bench::run(&store, &config.bench)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{report}");
            }
            Ok(())
        }
    }
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "hostcore={level},hostcore_clock={level},hostcore_kv={level},hostcore_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// System-wide configuration file.
const SYSTEM_CONFIG_PATH: &str = "/etc/hostcore/config.toml";

/// Configuration file for local development.
const LOCAL_CONFIG_PATH: &str = "config/default.toml";

/// Load the configuration `hostcore` runs with.
///
/// An explicit `--config` must exist. Otherwise the first existing file of
/// `HOSTCORE_CONFIG_PATH`, the system path and the local path is used, and
/// built-in defaults when there is none.
fn load_config(args: &Args) -> Result<CoreConfig> {
    if let Some(path) = &args.config {
        info!(?path, "Loading config from --config");
        return CoreConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {path:?}"));
    }

    let env_path = std::env::var_os("HOSTCORE_CONFIG_PATH").map(PathBuf::from);
    if let Some(path) = env_path.as_ref().filter(|path| !path.exists()) {
        warn!(?path, "HOSTCORE_CONFIG_PATH set but file does not exist");
    }

    let config = load_first_existing(config_candidates(env_path))?;
    Ok(config.unwrap_or_else(|| {
        info!("No config file found, using built-in defaults");
        CoreConfig::default()
    }))
}

/// Config file locations in lookup order, each with where it came from.
fn config_candidates(env_path: Option<PathBuf>) -> Vec<(PathBuf, &'static str)> {
    env_path
        .map(|path| (path, "HOSTCORE_CONFIG_PATH"))
        .into_iter()
        .chain([
            (PathBuf::from(SYSTEM_CONFIG_PATH), "system path"),
            (PathBuf::from(LOCAL_CONFIG_PATH), "local path"),
        ])
        .collect()
}

/// Parse the first candidate that exists, or `None` if none does.
fn load_first_existing(candidates: Vec<(PathBuf, &'static str)>) -> Result<Option<CoreConfig>> {
    for (path, source) in candidates {
        if !path.exists() {
            debug!(?path, source, "config candidate missing");
            continue;
        }
        info!(?path, source, "Loading config");
        let config = CoreConfig::from_file(&path)
            .with_context(|| format!("Failed to load config from {source} {path:?}"))?;
        return Ok(Some(config));
    }
    Ok(None)
}

/// Strategy the process-wide clock runs with.
///
/// Builds with the `emulated-clock` feature always emulate; others follow
/// the configuration.
fn clock_strategy(configured: ClockStrategy, emulated_build: bool) -> ClockStrategy {
    if emulated_build {
        ClockStrategy::Emulated
    } else {
        configured
    }
}

/// Install the configured calibrator and clock as the process-wide ones.
///
/// The calibrator goes first: the emulated clock on x86 reads the
/// invariant frequency while it initializes.
fn install_clock(config: &CoreConfig) -> Result<()> {
    if calibration::install_global(Calibrator::from_config(&config.clock)).is_err() {
        warn!("CPU calibrator already in use, keeping it");
    }

    let strategy = clock_strategy(config.clock.strategy, cfg!(feature = "emulated-clock"));
    let clock = match SystemClock::from_strategy(strategy) {
        Ok(clock) => clock,
        Err(CoreError::TickCounterUnavailable(reason)) => {
            warn!(%reason, "no tick counter for emulation, using native clock");
            SystemClock::Native(NativeClock)
        }
        Err(e) => return Err(e).context("Failed to initialize monotonic clock"),
    };
    info!(
        strategy = %clock.strategy(),
        configured = %config.clock.strategy,
        "Monotonic clock configured"
    );
    if monotonic::install_global(clock).is_err() {
        warn!("Monotonic clock already in use, keeping it");
    }
    Ok(())
}

/// Clock readings reported by `hostcore clock`.
#[derive(Debug, Serialize)]
struct ClockReport {
    strategy: String,
    frequency_hz: i64,
    is_invariant: bool,
    invariant_frequency_hz: i64,
    monotonic_ns: i64,
    cpuwide_ns: i64,
    cycle_counter: Option<u64>,
}

impl ClockReport {
    fn collect() -> Self {
        let calibration = ClockCalibration::global();
        Self {
            strategy: SystemClock::global().strategy().to_string(),
            frequency_hz: calibration.frequency_hz,
            is_invariant: calibration.is_invariant,
            invariant_frequency_hz: calibration.invariant_frequency(),
            monotonic_ns: monotonic_time_ns(),
            cpuwide_ns: cpuwide_time_ns(),
            cycle_counter: read_cycle_counter(),
        }
    }
}

fn print_clock(json: bool) -> Result<()> {
    let report = ClockReport::collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("strategy:          {}", report.strategy);
    println!("cpu frequency:     {} Hz", report.frequency_hz);
    println!("invariant counter: {}", report.is_invariant);
    println!("invariant freq:    {} Hz", report.invariant_frequency_hz);
    println!("monotonic:         {} ns", report.monotonic_ns);
    println!("cpu-wide:          {} ns", report.cpuwide_ns);
    match report.cycle_counter {
        Some(cycles) => println!("cycle counter:     {cycles}"),
        None => println!("cycle counter:     unavailable"),
    }
    Ok(())
}
