//! Multi-threaded GET/SET load generator.
//!
//! Every worker borrows the same [`ShardedStore`] through its own pair of
//! command handlers and issues commands until the deadline passes. One in
//! four commands is a SET, the rest are GETs over the same key space.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use hostcore_clock::{monotonic_time_ns, Timer};
use hostcore_common::config::BenchConfig;
use hostcore_kv::{CommandHandler, GetCommandHandler, Reply, SetCommandHandler, ShardedStore};
use serde::Serialize;
use std::thread::ScopedJoinHandle;
use tracing::{debug, info};

/// Commands issued between deadline checks.
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Counters of one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct WorkerStats {
    sets: u64,
    gets: u64,
    hits: u64,
    rejected: u64,
    latency_ns: u64,
}

impl WorkerStats {
    fn merge(&mut self, other: WorkerStats) {
        self.sets += other.sets;
        self.gets += other.gets;
        self.hits += other.hits;
        self.rejected += other.rejected;
        self.latency_ns += other.latency_ns;
    }
}

/// Outcome of a load run.
#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    /// Worker threads.
    pub threads: usize,
    /// Wall time of the whole run.
    #[serde(serialize_with = "hostcore_common::config::human_duration::serialize")]
    pub elapsed: Duration,
    /// SET commands issued.
    pub sets: u64,
    /// GET commands issued.
    pub gets: u64,
    /// GETs that found a value.
    pub hits: u64,
    /// Commands answered with an error reply.
    pub rejected: u64,
    /// Mean time spent in one command, in nanoseconds.
    pub mean_latency_ns: u64,
    /// Entries in the store afterwards.
    pub entries: usize,
    /// Entries per shard afterwards.
    pub shard_lens: Vec<usize>,
}

impl BenchReport {
    /// Total commands issued.
    pub fn ops(&self) -> u64 {
        self.sets + self.gets
    }

    /// Commands per second over the run.
    #[allow(clippy::cast_precision_loss)]
    pub fn ops_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.ops() as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min = self.shard_lens.iter().min().copied().unwrap_or(0);
        let max = self.shard_lens.iter().max().copied().unwrap_or(0);
        writeln!(f, "threads:      {}", self.threads)?;
        writeln!(
            f,
            "elapsed:      {}",
            humantime::format_duration(Duration::from_millis(
                u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
            ))
        )?;
        writeln!(f, "commands:     {} ({:.0}/s)", self.ops(), self.ops_per_sec())?;
        writeln!(f, "sets:         {}", self.sets)?;
        writeln!(f, "gets:         {} ({} hits)", self.gets, self.hits)?;
        writeln!(f, "rejected:     {}", self.rejected)?;
        writeln!(f, "mean latency: {} ns", self.mean_latency_ns)?;
        write!(
            f,
            "entries:      {} across {} shards (min {min}, max {max})",
            self.entries,
            self.shard_lens.len()
        )
    }
}

/// Drive `store` with `config.threads` workers for `config.duration`.
///
/// # Errors
///
/// Returns an error if the thread count or key space is zero, or if a
/// worker thread panicked.
pub fn run(store: &ShardedStore, config: &BenchConfig) -> Result<BenchReport> {
    ensure!(config.threads > 0, "bench needs at least one thread");
    ensure!(config.key_space > 0, "bench needs a non-empty key space");

    let duration_ns = i64::try_from(config.duration.as_nanos()).unwrap_or(i64::MAX);
    let value = "x".repeat(config.value_size);

    info!(
        threads = config.threads,
        duration = %humantime::format_duration(config.duration),
        key_space = config.key_space,
        "starting load"
    );

    let mut timer = Timer::started();
    let deadline_ns = monotonic_time_ns().saturating_add(duration_ns);

    let per_worker = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..config.threads)
            .map(|worker| {
                let value = value.as_str();
                scope.spawn(move || {
                    worker_loop(store, worker, config.key_space, value, deadline_ns)
                })
            })
            .collect();
        join_workers(handles)
    })?;
    timer.stop();

    let mut total = WorkerStats::default();
    for stats in per_worker {
        total.merge(stats);
    }

    let report = BenchReport {
        threads: config.threads,
        elapsed: Duration::from_nanos(u64::try_from(timer.n_elapsed()).unwrap_or(0)),
        sets: total.sets,
        gets: total.gets,
        hits: total.hits,
        rejected: total.rejected,
        mean_latency_ns: total.latency_ns.checked_div(total.sets + total.gets).unwrap_or(0),
        entries: store.len(),
        shard_lens: store.shard_lens(),
    };
    info!(ops = report.ops(), ops_per_sec = report.ops_per_sec(), "load finished");
    Ok(report)
}

/// Join every worker; a panicked worker fails the whole run.
fn join_workers(handles: Vec<ScopedJoinHandle<'_, WorkerStats>>) -> Result<Vec<WorkerStats>> {
    handles
        .into_iter()
        .enumerate()
        .map(|(worker, handle)| {
            handle
                .join()
                .map_err(|_| anyhow!("bench worker {worker} panicked"))
        })
        .collect()
}

fn worker_loop(
    store: &ShardedStore,
    worker: usize,
    key_space: usize,
    value: &str,
    deadline_ns: i64,
) -> WorkerStats {
    let get = GetCommandHandler::new(store);
    let set = SetCommandHandler::new(store);
    let mut stats = WorkerStats::default();
    let mut reply = Reply::default();
    let mut timer = Timer::new();
    let mut key = String::new();
    let mut i: u64 = 0;

    loop {
        if i % DEADLINE_CHECK_INTERVAL == 0 && monotonic_time_ns() >= deadline_ns {
            break;
        }

        key.clear();
        key.push_str("key:");
        key.push_str(&key_index(worker, i, key_space).to_string());

        timer.start();
        if i % 4 == 0 {
            stats.sets += 1;
            set.run(&["set", key.as_str(), value], &mut reply);
        } else {
            stats.gets += 1;
            get.run(&["get", key.as_str()], &mut reply);
            if reply.as_bulk().is_some() {
                stats.hits += 1;
            }
        }
        timer.stop();
        stats.latency_ns += u64::try_from(timer.n_elapsed()).unwrap_or(0);

        if reply.is_error() {
            stats.rejected += 1;
        }
        i += 1;
    }

    debug!(worker, commands = i, "worker done");
    stats
}

/// Spread workers over the key space with a large odd stride.
fn key_index(worker: usize, i: u64, key_space: usize) -> u64 {
    let space = key_space as u64;
    (i.wrapping_mul(7919).wrapping_add(worker as u64 * 104_729)) % space
}
