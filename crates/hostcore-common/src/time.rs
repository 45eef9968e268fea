//! Time unit constants shared by the clock and its consumers.
//!
//! All timestamps in this workspace are signed 64-bit nanosecond counts,
//! matching what `clock_gettime` yields once seconds are folded in.

/// Nanoseconds per microsecond.
pub const NS_PER_US: i64 = 1_000;
/// Nanoseconds per millisecond.
pub const NS_PER_MS: i64 = 1_000_000;
/// Nanoseconds per second.
pub const NS_PER_SEC: i64 = 1_000_000_000;
/// Microseconds per second.
pub const US_PER_SEC: i64 = 1_000_000;
/// Milliseconds per second.
pub const MS_PER_SEC: i64 = 1_000;

/// A `(seconds, nanoseconds)` pair with `nanos` kept in `0..NS_PER_SEC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timespec {
    /// Whole seconds.
    pub secs: i64,
    /// Nanoseconds within the second.
    pub nanos: i64,
}

impl Timespec {
    /// Build a timespec, carrying any nanosecond overflow into `secs`.
    #[must_use]
    pub fn new(secs: i64, nanos: i64) -> Self {
        Self {
            secs: secs + nanos.div_euclid(NS_PER_SEC),
            nanos: nanos.rem_euclid(NS_PER_SEC),
        }
    }

    /// Add a nanosecond count and renormalize.
    #[must_use]
    pub fn add_nanos(self, elapsed: u64) -> Self {
        let secs = i64::try_from(elapsed / NS_PER_SEC as u64).unwrap_or(i64::MAX);
        // Always < NS_PER_SEC, fits.
        let nanos = (elapsed % NS_PER_SEC as u64) as i64;
        Self::new(self.secs.saturating_add(secs), self.nanos + nanos)
    }

    /// Total nanoseconds.
    #[must_use]
    pub fn as_nanos(self) -> i64 {
        self.secs
            .saturating_mul(NS_PER_SEC)
            .saturating_add(self.nanos)
    }
}
