//! Hardware tick counters backing the emulated monotonic clock.

use hostcore_common::error::{CoreError, CoreResult};
use hostcore_common::time::{Timespec, NS_PER_SEC};

/// Ratio converting ticks to nanoseconds: `ns = ticks * numer / denom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timebase {
    /// Numerator.
    pub numer: u64,
    /// Denominator, never zero for a usable timebase.
    pub denom: u64,
}

impl Timebase {
    /// One tick per nanosecond.
    pub const NANOSECONDS: Self = Self { numer: 1, denom: 1 };

    /// Timebase of a counter ticking at `frequency_hz`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TickCounterUnavailable`] for a non-positive frequency.
    pub fn from_frequency(frequency_hz: i64) -> CoreResult<Self> {
        let denom = u64::try_from(frequency_hz)
            .ok()
            .filter(|&hz| hz > 0)
            .ok_or_else(|| {
                CoreError::TickCounterUnavailable(format!(
                    "tick frequency {frequency_hz} Hz is not usable"
                ))
            })?;
        Ok(Self {
            numer: NS_PER_SEC as u64,
            denom,
        })
    }

    /// Convert a tick count to nanoseconds, saturating at `u64::MAX`.
    #[must_use]
    pub fn ticks_to_nanos(&self, ticks: u64) -> u64 {
        if self.denom == 0 {
            return 0;
        }
        let ns = u128::from(ticks) * u128::from(self.numer) / u128::from(self.denom);
        u64::try_from(ns).unwrap_or(u64::MAX)
    }
}

/// A free-running hardware counter with a known tick rate.
pub trait TickCounter: Send + Sync + std::fmt::Debug {
    /// Current counter value.
    fn ticks(&self) -> u64;

    /// Ticks-to-nanoseconds ratio.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot report it.
    fn timebase(&self) -> CoreResult<Timebase>;

    /// Current wall-clock time, read once to anchor the emulated clock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ClockInit`] if the wall clock cannot be read.
    fn wall_clock(&self) -> CoreResult<Timespec> {
        wall_clock_now()
    }
}

impl TickCounter for Box<dyn TickCounter> {
    fn ticks(&self) -> u64 {
        self.as_ref().ticks()
    }

    fn timebase(&self) -> CoreResult<Timebase> {
        self.as_ref().timebase()
    }

    fn wall_clock(&self) -> CoreResult<Timespec> {
        self.as_ref().wall_clock()
    }
}

/// Read `CLOCK_REALTIME`.
#[cfg(unix)]
fn wall_clock_now() -> CoreResult<Timespec> {
    use nix::time::{clock_gettime, ClockId};

    let ts = clock_gettime(ClockId::CLOCK_REALTIME)
        .map_err(|e| CoreError::ClockInit(format!("clock_gettime(CLOCK_REALTIME): {e}")))?;
    Ok(Timespec::new(i64::from(ts.tv_sec()), i64::from(ts.tv_nsec())))
}

#[cfg(not(unix))]
fn wall_clock_now() -> CoreResult<Timespec> {
    use std::time::{SystemTime, UNIX_EPOCH};

    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| CoreError::ClockInit(format!("wall clock before epoch: {e}")))?;
    let secs = i64::try_from(since_epoch.as_secs())
        .map_err(|_| CoreError::ClockInit("wall clock seconds overflow".into()))?;
    Ok(Timespec::new(secs, i64::from(since_epoch.subsec_nanos())))
}

/// Read the CPU cycle counter, if the target has one.
#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
#[inline]
#[allow(unused_unsafe)]
pub fn read_cycle_counter() -> Option<u64> {
    #[cfg(target_arch = "x86")]
    use std::arch::x86::_rdtsc;
    #[cfg(target_arch = "x86_64")]
    use std::arch::x86_64::_rdtsc;

    // SAFETY: RDTSC only reads the time stamp counter.
    Some(unsafe { _rdtsc() })
}

/// Read the CPU cycle counter, if the target has one.
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
#[inline]
pub fn read_cycle_counter() -> Option<u64> {
    None
}

/// Mach absolute time, the tick source on Apple platforms.
#[cfg(target_vendor = "apple")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MachTicks;

#[cfg(target_vendor = "apple")]
#[allow(deprecated)]
impl TickCounter for MachTicks {
    fn ticks(&self) -> u64 {
        // SAFETY: mach_absolute_time has no preconditions.
        unsafe { libc::mach_absolute_time() }
    }

    fn timebase(&self) -> CoreResult<Timebase> {
        let mut info = libc::mach_timebase_info { numer: 0, denom: 0 };
        // SAFETY: `info` is a valid, writable mach_timebase_info.
        let rc = unsafe { libc::mach_timebase_info(&mut info) };
        if rc != 0 {
            return Err(CoreError::ClockInit(format!(
                "mach_timebase_info returned {rc}"
            )));
        }
        Ok(Timebase {
            numer: u64::from(info.numer),
            denom: u64::from(info.denom),
        })
    }
}

/// The x86 time stamp counter, usable only when it runs at an invariant rate.
#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
#[derive(Debug, Clone, Copy)]
pub struct TscTicks {
    timebase: Timebase,
}

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
impl TscTicks {
    /// A counter ticking at `frequency_hz`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TickCounterUnavailable`] if the frequency is not positive.
    pub fn new(frequency_hz: i64) -> CoreResult<Self> {
        Ok(Self {
            timebase: Timebase::from_frequency(frequency_hz)?,
        })
    }

    /// A counter ticking at the process-wide invariant frequency.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TickCounterUnavailable`] when the CPU has no
    /// invariant counter or its frequency is unknown.
    pub fn from_global() -> CoreResult<Self> {
        Self::new(crate::calibration::read_invariant_cpu_frequency())
    }
}

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
impl TickCounter for TscTicks {
    fn ticks(&self) -> u64 {
        read_cycle_counter().unwrap_or(0)
    }

    fn timebase(&self) -> CoreResult<Timebase> {
        Ok(self.timebase)
    }
}

/// The tick counter the emulated clock uses on this platform.
///
/// # Errors
///
/// Returns [`CoreError::TickCounterUnavailable`] if there is none.
#[cfg(target_vendor = "apple")]
pub fn platform_tick_counter() -> CoreResult<Box<dyn TickCounter>> {
    Ok(Box::new(MachTicks))
}

/// The tick counter the emulated clock uses on this platform.
///
/// # Errors
///
/// Returns [`CoreError::TickCounterUnavailable`] if there is none.
#[cfg(all(
    not(target_vendor = "apple"),
    any(target_arch = "x86_64", target_arch = "x86")
))]
pub fn platform_tick_counter() -> CoreResult<Box<dyn TickCounter>> {
    Ok(Box::new(TscTicks::from_global()?))
}

/// The tick counter the emulated clock uses on this platform.
///
/// # Errors
///
/// Returns [`CoreError::TickCounterUnavailable`] if there is none.
#[cfg(all(
    not(target_vendor = "apple"),
    not(any(target_arch = "x86_64", target_arch = "x86"))
))]
pub fn platform_tick_counter() -> CoreResult<Box<dyn TickCounter>> {
    Err(CoreError::TickCounterUnavailable(
        "no tick counter on this platform".into(),
    ))
}
