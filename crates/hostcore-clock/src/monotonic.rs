//! Monotonic nanosecond clock.
//!
//! Two strategies implement [`MonotonicSource`]:
//!
//! - [`NativeClock`]: the OS monotonic clock (`CLOCK_MONOTONIC`).
//! - [`EmulatedClock`]: for hosts without one. On first use it captures a
//!   wall-clock anchor, a tick counter reading and the counter's timebase;
//!   every later reading is `anchor + (ticks - anchor_ticks) * numer / denom`.
//!   Wall-clock steps after the anchor was taken are never observed.
//!
//! [`SystemClock`] picks one of them once per process. A clock that cannot
//! read its timebase or the wall clock at initialization terminates the
//! process instead of returning wrong times.

use std::sync::OnceLock;

use hostcore_common::config::ClockStrategy;
use hostcore_common::error::{CoreError, CoreResult};
use hostcore_common::time::{Timespec, NS_PER_MS, NS_PER_SEC, NS_PER_US};
use tracing::{debug, error, info, warn};

use crate::ticks::{platform_tick_counter, TickCounter, Timebase};

/// A source of monotonic nanosecond timestamps.
pub trait MonotonicSource: Send + Sync {
    /// Nanoseconds since an arbitrary fixed point, never decreasing.
    fn now_ns(&self) -> i64;
}

/// Log a clock that cannot be trusted and exit.
fn terminate_on_clock_failure(err: &CoreError) -> ! {
    error!(error = %err, "monotonic clock unusable, terminating");
    std::process::exit(1)
}

/// The operating system's monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeClock;

impl NativeClock {
    /// Read the clock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ClockInit`] if the OS refuses the query.
    #[cfg(unix)]
    pub fn try_now(&self) -> CoreResult<Timespec> {
        use nix::time::{clock_gettime, ClockId};

        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map_err(|e| CoreError::ClockInit(format!("clock_gettime(CLOCK_MONOTONIC): {e}")))?;
        Ok(Timespec::new(i64::from(ts.tv_sec()), i64::from(ts.tv_nsec())))
    }

    /// Read the clock.
    ///
    /// Measured from the first call in this process.
    #[cfg(not(unix))]
    pub fn try_now(&self) -> CoreResult<Timespec> {
        use std::time::Instant;

        static START: OnceLock<Instant> = OnceLock::new();
        let elapsed = START.get_or_init(Instant::now).elapsed();
        let secs = i64::try_from(elapsed.as_secs())
            .map_err(|_| CoreError::ClockInit("elapsed seconds overflow".into()))?;
        Ok(Timespec::new(secs, i64::from(elapsed.subsec_nanos())))
    }
}

impl MonotonicSource for NativeClock {
    #[inline]
    fn now_ns(&self) -> i64 {
        match self.try_now() {
            Ok(ts) => ts.as_nanos(),
            Err(e) => terminate_on_clock_failure(&e),
        }
    }
}

/// Readings captured once when an emulated clock starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    wall: Timespec,
    ticks: u64,
    timebase: Timebase,
}

/// Monotonic clock built from a wall-clock anchor and a tick counter.
#[derive(Debug)]
pub struct EmulatedClock<T> {
    counter: T,
    anchor: OnceLock<CoreResult<Anchor>>,
}

impl<T: TickCounter> EmulatedClock<T> {
    /// Emulate a monotonic clock on top of `counter`.
    ///
    /// Nothing is read until the first query.
    pub fn new(counter: T) -> Self {
        Self {
            counter,
            anchor: OnceLock::new(),
        }
    }

    /// Capture the anchor if no thread did yet; all first callers wait for it.
    fn anchor(&self) -> CoreResult<&Anchor> {
        self.anchor
            .get_or_init(|| {
                let timebase = self.counter.timebase()?;
                if timebase.denom == 0 {
                    return Err(CoreError::ClockInit("timebase denominator is zero".into()));
                }
                let wall = self.counter.wall_clock()?;
                let ticks = self.counter.ticks();
                debug!(?wall, ticks, ?timebase, "emulated clock anchored");
                Ok(Anchor {
                    wall,
                    ticks,
                    timebase,
                })
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Initialize the clock now instead of on first query.
    ///
    /// # Errors
    ///
    /// Returns the initialization failure, which every later call repeats.
    pub fn init(&self) -> CoreResult<()> {
        self.anchor().map(|_| ())
    }

    /// Read the clock.
    ///
    /// # Errors
    ///
    /// Returns the initialization failure if the anchor could not be taken.
    pub fn try_now(&self) -> CoreResult<Timespec> {
        let anchor = self.anchor()?;
        let elapsed_ticks = self.counter.ticks().saturating_sub(anchor.ticks);
        Ok(anchor.wall.add_nanos(anchor.timebase.ticks_to_nanos(elapsed_ticks)))
    }

    /// The underlying tick counter.
    pub fn counter(&self) -> &T {
        &self.counter
    }
}

impl<T: TickCounter> MonotonicSource for EmulatedClock<T> {
    #[inline]
    fn now_ns(&self) -> i64 {
        match self.try_now() {
            Ok(ts) => ts.as_nanos(),
            Err(e) => terminate_on_clock_failure(&e),
        }
    }
}

/// The clock strategy chosen for this process.
#[derive(Debug)]
pub enum SystemClock {
    /// `CLOCK_MONOTONIC`.
    Native(NativeClock),
    /// Wall-clock anchor plus the platform tick counter.
    Emulated(EmulatedClock<Box<dyn TickCounter>>),
}

impl SystemClock {
    /// Build a clock for `strategy`.
    ///
    /// # Errors
    ///
    /// Returns an error for [`ClockStrategy::Emulated`] when the platform
    /// has no usable tick counter.
    pub fn from_strategy(strategy: ClockStrategy) -> CoreResult<Self> {
        match strategy {
            ClockStrategy::Native => Ok(SystemClock::Native(NativeClock)),
            ClockStrategy::Emulated => {
                let clock = EmulatedClock::new(platform_tick_counter()?);
                clock.init()?;
                Ok(SystemClock::Emulated(clock))
            }
        }
    }

    /// The strategy in use.
    pub fn strategy(&self) -> ClockStrategy {
        match self {
            SystemClock::Native(_) => ClockStrategy::Native,
            SystemClock::Emulated(_) => ClockStrategy::Emulated,
        }
    }

    /// The process-wide clock, built on first use.
    ///
    /// Uses the emulated strategy when the `emulated-clock` feature is
    /// enabled and the platform has a tick counter, the native one otherwise.
    /// Terminates the process if the emulated clock fails to initialize.
    pub fn global() -> &'static SystemClock {
        GLOBAL_CLOCK.get_or_init(|| {
            let strategy = if cfg!(feature = "emulated-clock") {
                ClockStrategy::Emulated
            } else {
                ClockStrategy::Native
            };
            let clock = match SystemClock::from_strategy(strategy) {
                Ok(clock) => clock,
                Err(CoreError::TickCounterUnavailable(reason)) => {
                    warn!(%reason, "no tick counter for emulation, using native clock");
                    SystemClock::Native(NativeClock)
                }
                Err(e) => terminate_on_clock_failure(&e),
            };
            info!(strategy = %clock.strategy(), "monotonic clock selected");
            clock
        })
    }
}

impl MonotonicSource for SystemClock {
    #[inline]
    fn now_ns(&self) -> i64 {
        match self {
            SystemClock::Native(clock) => clock.now_ns(),
            SystemClock::Emulated(clock) => clock.now_ns(),
        }
    }
}

static GLOBAL_CLOCK: OnceLock<SystemClock> = OnceLock::new();

/// Use `clock` as the process-wide clock.
///
/// # Errors
///
/// Hands `clock` back if the process-wide clock was already chosen.
pub fn install_global(clock: SystemClock) -> Result<(), SystemClock> {
    GLOBAL_CLOCK.set(clock)
}

/// Monotonic nanoseconds from the process-wide clock.
#[inline]
pub fn now_ns() -> i64 {
    SystemClock::global().now_ns()
}

/// Alias of [`now_ns`].
#[inline]
pub fn monotonic_time_ns() -> i64 {
    now_ns()
}

/// Monotonic microseconds.
#[inline]
pub fn monotonic_time_us() -> i64 {
    now_ns() / NS_PER_US
}

/// Monotonic milliseconds.
#[inline]
pub fn monotonic_time_ms() -> i64 {
    now_ns() / NS_PER_MS
}

/// Monotonic seconds.
#[inline]
pub fn monotonic_time_s() -> i64 {
    now_ns() / NS_PER_SEC
}
