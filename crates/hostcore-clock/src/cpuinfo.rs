//! CPU information text access and parsing.
//!
//! The Linux procfs file carries one block per logical CPU, e.g.
//!
//! ```text
//! model name      : Intel(R) Xeon(R) CPU E5-2620 v2 @ 2.10GHz
//! cpu MHz         : 497.840237
//! flags           : fpu vme ... constant_tsc ... nonstop_tsc ...
//! ```
//!
//! Only a fixed-size prefix is read, which always covers the first CPU.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

/// Feature flag advertising a tick counter that ignores frequency scaling.
pub const CONSTANT_TSC_FLAG: &[u8] = b"constant_tsc";
/// Feature flag advertising a tick counter that keeps running in deep C-states.
pub const NONSTOP_TSC_FLAG: &[u8] = b"nonstop_tsc";

const FLAGS_FIELD: &[u8] = b"flags";
const CPU_MHZ_FIELD: &[u8] = b"cpu MHz";

/// Source of the CPU information text.
pub trait CpuInfoSource: Send + Sync {
    /// Fill `buf` with a prefix of the text, returning the number of bytes read.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be read.
    fn read_prefix(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// CPU information read from a file, `/proc/cpuinfo` by default.
#[derive(Debug, Clone)]
pub struct ProcCpuInfo {
    path: PathBuf,
}

impl ProcCpuInfo {
    /// Read from the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcCpuInfo {
    fn default() -> Self {
        Self::new("/proc/cpuinfo")
    }
}

impl CpuInfoSource for ProcCpuInfo {
    fn read_prefix(&self, buf: &mut [u8]) -> io::Result<usize> {
        // One read call: procfs hands back at most a page per read anyway.
        File::open(&self.path)?.read(buf)
    }
}

/// Fixed CPU information text, for tests and replaying captured hosts.
#[derive(Debug, Clone, Default)]
pub struct StaticCpuInfo {
    text: Vec<u8>,
}

impl StaticCpuInfo {
    /// Serve the given text.
    pub fn new(text: impl Into<Vec<u8>>) -> Self {
        Self { text: text.into() }
    }
}

impl CpuInfoSource for StaticCpuInfo {
    fn read_prefix(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.text.len().min(buf.len());
        buf[..n].copy_from_slice(&self.text[..n]);
        Ok(n)
    }
}

/// Byte offset of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Whether the "flags" field lists both invariant tick counter capabilities.
///
/// The search starts at the first "flags" occurrence and runs to the end of
/// the buffer.
#[must_use]
pub fn has_invariant_tsc_flags(text: &[u8]) -> bool {
    let Some(start) = find(text, FLAGS_FIELD) else {
        return false;
    };
    let flags = &text[start..];
    find(flags, CONSTANT_TSC_FLAG).is_some() && find(flags, NONSTOP_TSC_FLAG).is_some()
}

/// Parse the "cpu MHz" field into Hz.
///
/// Every digit up to the end of the line is accumulated, decimal points are
/// only counted, and anything else is skipped. The result is then scaled so
/// that exactly six fractional digits are represented: `497.840237` and
/// `497.840` become `497_840_237` and `497_840_000`. Returns 0 when the field
/// is missing or carries no digits.
#[must_use]
pub fn parse_current_frequency(text: &[u8]) -> i64 {
    let Some(start) = find(text, CPU_MHZ_FIELD) else {
        return 0;
    };

    let mut rest = &text[start..];
    while let Some((&c, tail)) = rest.split_first() {
        if c.is_ascii_digit() || c == b'\n' {
            break;
        }
        rest = tail;
    }

    let mut result: i64 = 0;
    let mut seen_decpoint = false;
    let mut fraction_digits = 0usize;
    for &c in rest.iter().take_while(|&&c| c != b'\n') {
        if c.is_ascii_digit() {
            result = result.saturating_mul(10).saturating_add(i64::from(c - b'0'));
            if seen_decpoint {
                fraction_digits += 1;
            }
        } else if c == b'.' {
            seen_decpoint = true;
        }
    }

    while fraction_digits < 6 {
        result = result.saturating_mul(10);
        fraction_digits += 1;
    }
    result
}
