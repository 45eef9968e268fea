//! Monotonic time and CPU frequency calibration.
//!
//! This crate provides:
//! - [`monotonic`]: nanosecond monotonic clock, native or emulated from a
//!   wall-clock anchor and a hardware tick counter
//! - [`calibration`]: CPU frequency probe with invariant tick counter
//!   detection, cached once per process
//! - [`cpuinfo`] / [`cpuid`]: the two information sources the probe reads
//! - [`cycle`]: cycle-counter based CPU-wide time
//! - [`timer`]: elapsed-time stopwatch

pub mod calibration;
pub mod cpuid;
pub mod cpuinfo;
pub mod cycle;
pub mod monotonic;
pub mod ticks;
pub mod timer;

pub use calibration::{
    read_cpu_frequency, read_invariant_cpu_frequency, Calibrator, ClockCalibration,
    FrequencyProbe,
};
pub use cycle::cpuwide_time_ns;
pub use monotonic::{
    monotonic_time_ms, monotonic_time_ns, monotonic_time_s, monotonic_time_us, now_ns,
    EmulatedClock, MonotonicSource, NativeClock, SystemClock,
};
pub use ticks::{read_cycle_counter, TickCounter, Timebase};
pub use timer::Timer;
