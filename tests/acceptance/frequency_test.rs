//! CPU frequency detection acceptance tests.
//!
//! The probe is fed captured CPU information and CPUID answers, so the
//! results do not depend on the machine running the tests.
//!
//! # Acceptance Criteria
//!
//! - "cpu MHz : 497.840237" reads as 497840237, never invariant
//! - With invariant flags, CPUID leaf 0x16 wins over the brand string
//! - "@ 2.10GHz" in the brand string reads as 2,100,000,000
//! - Missing or unreadable information gives frequency 0

use super::common::{CPUINFO_INVARIANT, CPUINFO_SCALING};
use hostcore_clock::cpuid::{parse_brand_frequency, StaticCpuid, LEAF_FREQUENCY};
use hostcore_clock::cpuinfo::{ProcCpuInfo, StaticCpuInfo};
use hostcore_clock::{read_invariant_cpu_frequency, Calibrator, ClockCalibration, FrequencyProbe};
use hostcore_common::config::ClockConfig;
use std::io::Write;

fn probe(cpuinfo: &str, cpuid: StaticCpuid) -> FrequencyProbe {
    FrequencyProbe::new(StaticCpuInfo::new(cpuinfo), cpuid)
}

#[test]
fn test_current_frequency_from_cpu_mhz() {
    let cpuid = StaticCpuid::new()
        .with_intel_vendor(LEAF_FREQUENCY)
        .with_base_mhz(2300);

    let calibration = probe(CPUINFO_SCALING, cpuid.clone()).read_cpu_frequency(false);
    assert_eq!(
        calibration,
        ClockCalibration {
            frequency_hz: 497_840_237,
            is_invariant: false,
        }
    );

    // No invariant flags: asking for an invariant frequency changes nothing
    assert_eq!(
        probe(CPUINFO_SCALING, cpuid).read_cpu_frequency(true),
        calibration
    );
    assert_eq!(calibration.invariant_frequency(), 0);
}

#[test]
fn test_invariant_frequency_from_cpuid_leaf() {
    let cpuid = StaticCpuid::new()
        .with_intel_vendor(LEAF_FREQUENCY)
        .with_base_mhz(2100)
        .with_brand("Intel(R) Xeon(R) CPU E5-2620 v4 @ 2.33GHz");

    let calibration = probe(CPUINFO_INVARIANT, cpuid).read_cpu_frequency(true);
    assert_eq!(calibration.frequency_hz, 2_100_000_000);
    assert!(calibration.is_invariant);
    assert_eq!(calibration.invariant_frequency(), 2_100_000_000);
}

#[test]
fn test_invariant_frequency_from_brand_string() {
    // Highest standard leaf below 0x16: the frequency leaf is not trusted
    let cpuid = StaticCpuid::new()
        .with_intel_vendor(0x0d)
        .with_brand("Intel(R) Xeon(R) CPU E5-2620 v4 @ 2.10GHz");

    let calibration = probe(CPUINFO_INVARIANT, cpuid).read_cpu_frequency(true);
    assert_eq!(
        calibration,
        ClockCalibration {
            frequency_hz: 2_100_000_000,
            is_invariant: true,
        }
    );
}

#[test]
fn test_invariant_flags_without_cpuid_fall_back() {
    let calibration = probe(CPUINFO_INVARIANT, StaticCpuid::new()).read_cpu_frequency(true);
    assert_eq!(calibration.frequency_hz, 1_199_951_000);
    assert!(!calibration.is_invariant);
}

#[test]
fn test_brand_string_rounding() {
    assert_eq!(parse_brand_frequency(b"CPU @ 2.10GHz"), 2_100_000_000);
    assert_eq!(parse_brand_frequency(b"CPU @ 3.00GHz"), 3_000_000_000);
    assert_eq!(parse_brand_frequency(b"CPU @ 2.67GHz"), 2_666_666_666);
    assert_eq!(parse_brand_frequency(b"CPU @ 2.1GHz"), 0);
    assert_eq!(parse_brand_frequency(b"CPU 2.10GHz"), 0);
}

#[test]
fn test_unreadable_cpuinfo_is_unknown() {
    let missing = FrequencyProbe::new(ProcCpuInfo::new("/nonexistent/cpuinfo"), StaticCpuid::new());
    assert_eq!(missing.read_cpu_frequency(true), ClockCalibration::UNKNOWN);

    let no_mhz = probe("processor\t: 0\n", StaticCpuid::new());
    assert_eq!(no_mhz.read_cpu_frequency(false), ClockCalibration::UNKNOWN);
}

#[test]
fn test_calibrator_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CPUINFO_SCALING.as_bytes()).unwrap();

    let config = ClockConfig {
        cpuinfo_path: file.path().to_path_buf(),
        detect_invariant: false,
        ..ClockConfig::default()
    };
    let calibrator = Calibrator::from_config(&config);
    assert!(calibrator.cached().is_none());
    assert_eq!(calibrator.calibration().frequency_hz, 497_840_237);
    assert_eq!(calibrator.cached().map(|c| c.frequency_hz), Some(497_840_237));
}

#[test]
fn test_calibrator_reprobe_sees_new_information() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"cpu MHz\t\t: 800.000\n").unwrap();
    file.flush().unwrap();

    let mut calibrator = Calibrator::new(FrequencyProbe::new(
        ProcCpuInfo::new(file.path()),
        StaticCpuid::new(),
    ));
    assert_eq!(calibrator.calibration().frequency_hz, 800_000_000);

    std::fs::write(file.path(), b"cpu MHz\t\t: 3400.000\n").unwrap();
    // Cached until explicitly re-probed
    assert_eq!(calibrator.calibration().frequency_hz, 800_000_000);
    assert_eq!(calibrator.reprobe().frequency_hz, 3_400_000_000);
}

#[test]
fn test_process_invariant_frequency_never_negative() {
    assert!(read_invariant_cpu_frequency() >= 0);
    let global = ClockCalibration::global();
    assert!(global.frequency_hz >= 0);
    assert_eq!(global, ClockCalibration::global());
}
