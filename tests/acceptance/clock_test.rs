//! Monotonic clock acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Consecutive readings on one thread never decrease (10,000+ samples)
//! - An emulated clock ignores wall-clock steps after its anchor
//! - Concurrent first callers anchor the emulated clock exactly once

use super::common::SteppingTicks;
use hostcore_clock::{
    monotonic_time_ms, monotonic_time_ns, monotonic_time_s, monotonic_time_us, EmulatedClock,
    MonotonicSource, NativeClock, Timebase, Timer,
};
use hostcore_common::time::{NS_PER_MS, NS_PER_SEC};
use std::sync::Barrier;
use std::thread;

const SAMPLES: usize = 20_000;

fn assert_non_decreasing(source: &dyn MonotonicSource, samples: usize) {
    let mut prev = source.now_ns();
    for i in 0..samples {
        let now = source.now_ns();
        assert!(now >= prev, "sample {i}: {now} < {prev}");
        prev = now;
    }
}

#[test]
fn test_native_clock_is_monotonic() {
    assert_non_decreasing(&NativeClock, SAMPLES);
}

#[test]
fn test_process_clock_is_monotonic() {
    let mut prev = monotonic_time_ns();
    for _ in 0..SAMPLES {
        let now = monotonic_time_ns();
        assert!(now >= prev);
        prev = now;
    }
}

#[test]
fn test_unit_helpers_agree() {
    let ns = monotonic_time_ns();
    let us = monotonic_time_us();
    let ms = monotonic_time_ms();
    let s = monotonic_time_s();

    assert!(us >= ns / 1_000);
    assert!(ms >= ns / NS_PER_MS);
    assert!(s >= ns / NS_PER_SEC);
    // Later readings in coarser units cannot be far ahead of the first one
    assert!(s <= monotonic_time_ns() / NS_PER_SEC);
}

#[test]
fn test_emulated_clock_ignores_wall_clock_steps() {
    // Every wall read would jump an hour back
    let clock = EmulatedClock::new(SteppingTicks::new(10, -3_600));
    assert_non_decreasing(&clock, SAMPLES / 2);

    clock.counter().step_wall_clock(-86_400);
    assert_non_decreasing(&clock, SAMPLES / 2);

    clock.counter().step_wall_clock(86_400 * 365);
    let before = clock.now_ns();
    let after = clock.now_ns();
    assert_eq!(after - before, 10);

    assert_eq!(clock.counter().wall_reads(), 1);
}

#[test]
fn test_emulated_clock_uses_timebase() {
    // 24 MHz counter: 125/3 ns per tick
    let timebase = Timebase { numer: 125, denom: 3 };
    let clock = EmulatedClock::new(SteppingTicks::with_timebase(24_000_000, 0, timebase));

    let first = clock.now_ns();
    let second = clock.now_ns();
    assert_eq!(second - first, 1_000_000_000);
}

#[test]
fn test_emulated_clock_anchors_once_under_contention() {
    const THREADS: usize = 8;
    let clock = EmulatedClock::new(SteppingTicks::new(1, -1));
    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                barrier.wait();
                assert_non_decreasing(&clock, 1_000);
            });
        }
    });

    assert_eq!(clock.counter().wall_reads(), 1);
}

#[test]
fn test_timer_measures_process_clock() {
    let mut timer = Timer::started();
    thread::sleep(std::time::Duration::from_millis(5));
    timer.stop();

    assert!(timer.m_elapsed() >= 5);
    assert!(timer.u_elapsed() >= 5_000);
    assert_eq!(timer.n_elapsed() / 1_000, timer.u_elapsed());
}
