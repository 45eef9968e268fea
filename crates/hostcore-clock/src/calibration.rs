//! CPU frequency calibration and invariant tick counter detection.
//!
//! The OS-reported "cpu MHz" is an instantaneous reading that moves with
//! power management, so it is only the fallback. When the CPU advertises an
//! invariant tick counter (`constant_tsc` + `nonstop_tsc`), the base
//! frequency is taken from CPUID instead and the result is marked invariant.
//!
//! # Caching
//!
//! A [`Calibrator`] probes once, on first use, under execute-once semantics
//! and then serves the cached [`ClockCalibration`] without locking. The
//! process-wide calibrator is reached through [`ClockCalibration::global`];
//! it can be replaced before first use with [`install_global`].

use std::sync::OnceLock;

use hostcore_common::config::{ClockConfig, DEFAULT_CPUINFO_READ_LIMIT};
use tracing::{debug, info};

use crate::cpuid::{frequency_from_brand_string, frequency_from_leaf, CpuidSource, NativeCpuid};
use crate::cpuinfo::{has_invariant_tsc_flags, parse_current_frequency, CpuInfoSource, ProcCpuInfo};

/// Result of a frequency probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockCalibration {
    /// CPU frequency in Hz, 0 when undeterminable.
    pub frequency_hz: i64,
    /// Whether `frequency_hz` is the rate of a tick counter unaffected by
    /// frequency scaling. When false, do not convert cycles to time with it.
    pub is_invariant: bool,
}

impl ClockCalibration {
    /// Nothing could be determined.
    pub const UNKNOWN: Self = Self {
        frequency_hz: 0,
        is_invariant: false,
    };

    /// The process-wide calibration, probing on first call.
    #[must_use]
    pub fn global() -> ClockCalibration {
        global_calibrator().calibration()
    }

    /// The invariant frequency in Hz, or 0 if the counter is not invariant.
    #[must_use]
    pub fn invariant_frequency(&self) -> i64 {
        if self.is_invariant && self.frequency_hz >= 0 {
            self.frequency_hz
        } else {
            0
        }
    }
}

/// Reads CPU information and identification to determine the frequency.
pub struct FrequencyProbe {
    cpuinfo: Box<dyn CpuInfoSource>,
    cpuid: Box<dyn CpuidSource>,
    read_limit: usize,
}

impl std::fmt::Debug for FrequencyProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyProbe")
            .field("read_limit", &self.read_limit)
            .finish_non_exhaustive()
    }
}

impl Default for FrequencyProbe {
    fn default() -> Self {
        Self::new(ProcCpuInfo::default(), NativeCpuid)
    }
}

impl FrequencyProbe {
    /// Probe the given sources.
    pub fn new(
        cpuinfo: impl CpuInfoSource + 'static,
        cpuid: impl CpuidSource + 'static,
    ) -> Self {
        Self {
            cpuinfo: Box::new(cpuinfo),
            cpuid: Box::new(cpuid),
            read_limit: DEFAULT_CPUINFO_READ_LIMIT,
        }
    }

    /// Probe the host, reading CPU information from the configured path.
    pub fn from_config(config: &ClockConfig) -> Self {
        Self::new(ProcCpuInfo::new(&config.cpuinfo_path), NativeCpuid)
            .with_read_limit(config.cpuinfo_read_limit)
    }

    /// Read at most `limit` bytes of CPU information (at least one).
    #[must_use]
    pub fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = limit.max(1);
        self
    }

    /// Determine the CPU frequency.
    ///
    /// With `want_invariant`, the invariant path is tried first: it needs both
    /// invariant flags in the "flags" field and a positive frequency from the
    /// CPUID frequency leaf or, failing that, the brand string. Otherwise, or
    /// if that path yields nothing, the "cpu MHz" field is parsed and the
    /// result is never invariant. An unreadable source gives
    /// [`ClockCalibration::UNKNOWN`].
    pub fn read_cpu_frequency(&self, want_invariant: bool) -> ClockCalibration {
        let mut buf = vec![0u8; self.read_limit];
        let n = match self.cpuinfo.read_prefix(&mut buf) {
            Ok(n) if n > 0 => n,
            Ok(_) => {
                debug!("CPU information is empty");
                return ClockCalibration::UNKNOWN;
            }
            Err(e) => {
                debug!(error = %e, "CPU information unreadable");
                return ClockCalibration::UNKNOWN;
            }
        };
        let text = &buf[..n];

        if want_invariant && has_invariant_tsc_flags(text) {
            let mut frequency_hz = frequency_from_leaf(self.cpuid.as_ref());
            if frequency_hz <= 0 {
                frequency_hz = frequency_from_brand_string(self.cpuid.as_ref());
            }
            if frequency_hz > 0 {
                return ClockCalibration {
                    frequency_hz,
                    is_invariant: true,
                };
            }
            debug!("invariant tick counter advertised but CPUID gave no frequency");
        }

        ClockCalibration {
            frequency_hz: parse_current_frequency(text),
            is_invariant: false,
        }
    }
}

/// Owns a frequency probe and the calibration it produced.
#[derive(Debug)]
pub struct Calibrator {
    probe: FrequencyProbe,
    want_invariant: bool,
    cached: OnceLock<ClockCalibration>,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(FrequencyProbe::default())
    }
}

impl Calibrator {
    /// Calibrate with `probe`, asking for an invariant frequency.
    pub fn new(probe: FrequencyProbe) -> Self {
        Self {
            probe,
            want_invariant: true,
            cached: OnceLock::new(),
        }
    }

    /// Calibrate as the clock configuration says.
    pub fn from_config(config: &ClockConfig) -> Self {
        let mut calibrator = Self::new(FrequencyProbe::from_config(config));
        calibrator.want_invariant = config.detect_invariant;
        calibrator
    }

    /// The calibration, probing on the first call from any thread.
    pub fn calibration(&self) -> ClockCalibration {
        *self.cached.get_or_init(|| {
            let calibration = self.probe.read_cpu_frequency(self.want_invariant);
            info!(
                frequency_hz = calibration.frequency_hz,
                is_invariant = calibration.is_invariant,
                "CPU frequency calibrated"
            );
            calibration
        })
    }

    /// The cached calibration, if a probe already ran.
    pub fn cached(&self) -> Option<ClockCalibration> {
        self.cached.get().copied()
    }

    /// Drop the cached result and probe again.
    pub fn reprobe(&mut self) -> ClockCalibration {
        self.cached.take();
        self.calibration()
    }
}

static GLOBAL_CALIBRATOR: OnceLock<Calibrator> = OnceLock::new();

fn global_calibrator() -> &'static Calibrator {
    GLOBAL_CALIBRATOR.get_or_init(Calibrator::default)
}

/// Use `calibrator` for the process-wide calibration.
///
/// # Errors
///
/// Hands `calibrator` back if the process-wide calibrator was already
/// installed or used.
pub fn install_global(calibrator: Calibrator) -> Result<(), Calibrator> {
    GLOBAL_CALIBRATOR.set(calibrator)
}

/// Probe the host CPU with the default sources.
pub fn read_cpu_frequency(want_invariant: bool) -> ClockCalibration {
    FrequencyProbe::default().read_cpu_frequency(want_invariant)
}

/// The process-wide invariant frequency in Hz, always >= 0.
#[must_use]
pub fn read_invariant_cpu_frequency() -> i64 {
    ClockCalibration::global().invariant_frequency()
}
