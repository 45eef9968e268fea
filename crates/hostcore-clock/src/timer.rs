//! Stopwatch for measuring elapsed time, e.g. request latency.

use hostcore_common::time::{NS_PER_MS, NS_PER_SEC, NS_PER_US};

use crate::monotonic::now_ns;

/// Measures the interval between [`Timer::start`] and [`Timer::stop`].
///
/// ```
/// use hostcore_clock::Timer;
///
/// let mut timer = Timer::started();
/// // ... handle a request ...
/// timer.stop();
/// assert!(timer.n_elapsed() >= 0);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    start_ns: i64,
    stop_ns: i64,
}

impl Timer {
    /// A timer that has not been started.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A timer started now.
    #[must_use]
    pub fn started() -> Self {
        let mut timer = Self::new();
        timer.start();
        timer
    }

    /// Record the start time; also resets the stop time.
    pub fn start(&mut self) {
        self.start_ns = now_ns();
        self.stop_ns = self.start_ns;
    }

    /// Record the stop time.
    pub fn stop(&mut self) {
        self.stop_ns = now_ns();
    }

    /// Elapsed nanoseconds between start and stop.
    #[must_use]
    pub fn n_elapsed(&self) -> i64 {
        self.stop_ns - self.start_ns
    }

    /// Elapsed microseconds.
    #[must_use]
    pub fn u_elapsed(&self) -> i64 {
        self.n_elapsed() / NS_PER_US
    }

    /// Elapsed milliseconds.
    #[must_use]
    pub fn m_elapsed(&self) -> i64 {
        self.n_elapsed() / NS_PER_MS
    }

    /// Elapsed seconds.
    #[must_use]
    pub fn s_elapsed(&self) -> i64 {
        self.n_elapsed() / NS_PER_SEC
    }
}
