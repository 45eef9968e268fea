//! CPU-wide time from the cycle counter.
//!
//! When the counter runs at an invariant rate, converting a cycle count to
//! nanoseconds is cheaper than a clock syscall and consistent across cores.
//! Without an invariant frequency the monotonic clock is used instead.

use hostcore_common::time::NS_PER_SEC;

use crate::calibration::read_invariant_cpu_frequency;
use crate::monotonic::now_ns;
use crate::ticks::read_cycle_counter;

/// Convert `cycles` of a counter running at `frequency_hz` to nanoseconds.
///
/// Returns `None` for a non-positive frequency.
#[must_use]
pub fn cycles_to_ns(cycles: u64, frequency_hz: i64) -> Option<i64> {
    let hz = u128::try_from(frequency_hz).ok().filter(|&hz| hz > 0)?;
    let ns = u128::from(cycles) * NS_PER_SEC as u128 / hz;
    Some(i64::try_from(ns).unwrap_or(i64::MAX))
}

/// Nanoseconds derived from the cycle counter at the invariant frequency,
/// or [`now_ns`] when either is unavailable.
///
/// The two sources have different origins; compare readings only with
/// readings from this same function.
pub fn cpuwide_time_ns() -> i64 {
    let frequency_hz = read_invariant_cpu_frequency();
    read_cycle_counter()
        .and_then(|cycles| cycles_to_ns(cycles, frequency_hz))
        .unwrap_or_else(now_ns)
}
