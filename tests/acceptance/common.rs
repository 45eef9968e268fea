//! Common fixtures for acceptance tests.
//!
//! Provides:
//! - A tick counter whose wall clock jumps on every read
//! - Captured CPU information texts
//! - Key pickers for shard-aware store tests

#![allow(dead_code)]

use hostcore_clock::{TickCounter, Timebase};
use hostcore_common::error::CoreResult;
use hostcore_common::time::Timespec;
use hostcore_kv::ShardedStore;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

/// Tick counter advancing a fixed step per read, with a wall clock that
/// steps by `wall_step_secs` every time it is consulted.
#[derive(Debug)]
pub struct SteppingTicks {
    ticks: AtomicU64,
    step: u64,
    timebase: Timebase,
    wall_secs: AtomicI64,
    wall_step_secs: i64,
    wall_reads: AtomicUsize,
}

impl SteppingTicks {
    /// Counter at 1 tick per nanosecond, `step` ticks per read.
    pub fn new(step: u64, wall_step_secs: i64) -> Self {
        Self::with_timebase(step, wall_step_secs, Timebase::NANOSECONDS)
    }

    /// Counter with an explicit timebase.
    pub fn with_timebase(step: u64, wall_step_secs: i64, timebase: Timebase) -> Self {
        Self {
            ticks: AtomicU64::new(1_000),
            step,
            timebase,
            wall_secs: AtomicI64::new(1_700_000_000),
            wall_step_secs,
            wall_reads: AtomicUsize::new(0),
        }
    }

    /// Step the wall clock as an operator or NTP would.
    pub fn step_wall_clock(&self, secs: i64) {
        self.wall_secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Number of times the wall clock was read.
    pub fn wall_reads(&self) -> usize {
        self.wall_reads.load(Ordering::SeqCst)
    }
}

impl TickCounter for SteppingTicks {
    fn ticks(&self) -> u64 {
        self.ticks.fetch_add(self.step, Ordering::SeqCst)
    }

    fn timebase(&self) -> CoreResult<Timebase> {
        Ok(self.timebase)
    }

    fn wall_clock(&self) -> CoreResult<Timespec> {
        self.wall_reads.fetch_add(1, Ordering::SeqCst);
        let secs = self
            .wall_secs
            .fetch_add(self.wall_step_secs, Ordering::SeqCst);
        Ok(Timespec::new(secs, 0))
    }
}

/// CPU information of a frequency-scaling laptop CPU without invariant flags.
pub const CPUINFO_SCALING: &str = "processor\t: 0\n\
vendor_id\t: GenuineIntel\n\
cpu family\t: 6\n\
model name\t: Intel(R) Core(TM) i5-6200U CPU @ 2.30GHz\n\
cpu MHz\t\t: 497.840237\n\
cache size\t: 3072 KB\n\
flags\t\t: fpu vme de pse tsc msr pae mce cx8 apic sep mtrr\n";

/// CPU information of a server CPU with an invariant time stamp counter.
pub const CPUINFO_INVARIANT: &str = "processor\t: 0\n\
vendor_id\t: GenuineIntel\n\
model name\t: Intel(R) Xeon(R) CPU E5-2620 v4 @ 2.10GHz\n\
cpu MHz\t\t: 1199.951\n\
flags\t\t: fpu vme de pse tsc msr constant_tsc arch_perfmon nonstop_tsc cpuid\n";

/// Two keys that live in different shards of `store`.
pub fn keys_in_different_shards(store: &ShardedStore) -> (String, String) {
    let first = "key:0".to_string();
    let shard = store.shard_index(&first);
    let second = (1..)
        .map(|i| format!("key:{i}"))
        .find(|k| store.shard_index(k) != shard)
        .unwrap_or_default();
    (first, second)
}

/// One key per shard of `store`, in shard order.
pub fn one_key_per_shard(store: &ShardedStore) -> Vec<String> {
    let mut keys: Vec<Option<String>> = vec![None; store.shard_count()];
    let mut remaining = store.shard_count();
    let mut i = 0u64;
    while remaining > 0 {
        let key = format!("k{i}");
        let slot = &mut keys[store.shard_index(&key)];
        if slot.is_none() {
            *slot = Some(key);
            remaining -= 1;
        }
        i += 1;
    }
    keys.into_iter().flatten().collect()
}
