//! CPU identification queries used to read the base frequency.
//!
//! Two leaves are consulted: the processor frequency leaf (0x16), which
//! reports the base frequency in MHz on recent Intel parts, and the brand
//! string leaves (0x8000_0002..=0x8000_0004), whose text usually ends in
//! something like `@ 2.10GHz`.

/// Register values returned by one CPUID query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuidRegisters {
    /// EAX
    pub eax: u32,
    /// EBX
    pub ebx: u32,
    /// ECX
    pub ecx: u32,
    /// EDX
    pub edx: u32,
}

/// Leaf reporting the highest standard leaf and the vendor string.
pub const LEAF_VENDOR: u32 = 0;
/// Processor frequency information leaf.
pub const LEAF_FREQUENCY: u32 = 0x16;
/// Leaf reporting the highest extended leaf.
pub const LEAF_EXTENDED_MAX: u32 = 0x8000_0000;
/// First of the three brand string leaves.
pub const LEAF_BRAND_FIRST: u32 = 0x8000_0002;
/// Last of the three brand string leaves.
pub const LEAF_BRAND_LAST: u32 = 0x8000_0004;

/// "GenuineIntel" split across EBX, EDX, ECX.
const INTEL_EBX: u32 = 0x756e_6547;
const INTEL_EDX: u32 = 0x4965_6e69;
const INTEL_ECX: u32 = 0x6c65_746e;

/// Source of CPU identification data.
pub trait CpuidSource: Send + Sync {
    /// Run a query for `leaf`, or `None` when the instruction is unavailable.
    fn cpuid(&self, leaf: u32) -> Option<CpuidRegisters>;
}

/// The executing processor's CPUID instruction.
///
/// Always returns `None` on targets without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCpuid;

impl CpuidSource for NativeCpuid {
    #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
    #[allow(unused_unsafe)]
    fn cpuid(&self, leaf: u32) -> Option<CpuidRegisters> {
        #[cfg(target_arch = "x86")]
        use std::arch::x86::__cpuid;
        #[cfg(target_arch = "x86_64")]
        use std::arch::x86_64::__cpuid;

        // SAFETY: CPUID is available on every x86_64 processor and on every
        // i686-class processor Rust targets; it only reads identification data.
        let r = unsafe { __cpuid(leaf) };
        Some(CpuidRegisters {
            eax: r.eax,
            ebx: r.ebx,
            ecx: r.ecx,
            edx: r.edx,
        })
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
    fn cpuid(&self, _leaf: u32) -> Option<CpuidRegisters> {
        None
    }
}

/// Base frequency in Hz from the frequency leaf, or 0.
///
/// Only trusted on Intel processors whose highest standard leaf covers it.
#[must_use]
pub fn frequency_from_leaf(cpuid: &dyn CpuidSource) -> i64 {
    let Some(vendor) = cpuid.cpuid(LEAF_VENDOR) else {
        return 0;
    };
    let is_intel = vendor.ebx == INTEL_EBX && vendor.ecx == INTEL_ECX && vendor.edx == INTEL_EDX;
    if vendor.eax < LEAF_FREQUENCY || !is_intel {
        return 0;
    }
    cpuid
        .cpuid(LEAF_FREQUENCY)
        .map_or(0, |r| i64::from(r.eax) * 1_000_000)
}

/// The 48-byte processor brand string, if the extended leaves exist.
#[must_use]
pub fn brand_string(cpuid: &dyn CpuidSource) -> Option<[u8; 48]> {
    let max = cpuid.cpuid(LEAF_EXTENDED_MAX)?;
    if max.eax < LEAF_BRAND_LAST {
        return None;
    }

    let mut brand = [0u8; 48];
    for (chunk, leaf) in brand
        .chunks_exact_mut(16)
        .zip(LEAF_BRAND_FIRST..=LEAF_BRAND_LAST)
    {
        let r = cpuid.cpuid(leaf)?;
        for (dst, reg) in chunk.chunks_exact_mut(4).zip([r.eax, r.ebx, r.ecx, r.edx]) {
            dst.copy_from_slice(&reg.to_le_bytes());
        }
    }
    Some(brand)
}

/// Base frequency in Hz parsed from the brand string, or 0.
#[must_use]
pub fn frequency_from_brand_string(cpuid: &dyn CpuidSource) -> i64 {
    brand_string(cpuid).map_or(0, |brand| parse_brand_frequency(&brand))
}

/// Parse the `@ X.YZGHz` suffix of a brand string into Hz.
///
/// Only exactly that shape is accepted: one integer digit, a point, two
/// fractional digits, then `G`, with at least seven bytes remaining from the
/// first digit. The integer and first fractional digit are kept and the
/// second fractional digit is repeated eight times, so `2.10GHz` becomes
/// `2_100_000_000` and `2.33GHz` becomes `2_333_333_333`. A trailing 7 is
/// repeated as 6 (`2.67GHz` gives `2_666_666_666`). Anything else yields 0,
/// as does a newline before the `@`.
#[must_use]
pub fn parse_brand_frequency(brand: &[u8]) -> i64 {
    let mut pos = 0;
    while pos < brand.len() && brand[pos] != b'@' {
        if brand[pos] == b'\n' {
            return 0;
        }
        pos += 1;
    }
    while pos < brand.len() && !brand[pos].is_ascii_digit() {
        pos += 1;
    }

    let p = &brand[pos..];
    if p.len() < 7 || p[1] != b'.' || !p[2].is_ascii_digit() || !p[3].is_ascii_digit() || p[4] != b'G'
    {
        return 0;
    }

    let digit = |c: u8| i64::from(c) - i64::from(b'0');
    let mut result = digit(p[0]) * 10 + digit(p[2]);
    let last = match digit(p[3]) {
        7 => 6,
        d => d,
    };
    for _ in 0..8 {
        result = result * 10 + last;
    }
    result
}

/// Canned CPUID answers keyed by leaf.
#[derive(Debug, Clone, Default)]
pub struct StaticCpuid {
    leaves: Vec<(u32, CpuidRegisters)>,
}

impl StaticCpuid {
    /// No leaves at all, like a processor without CPUID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `leaf` with `regs`.
    #[must_use]
    pub fn with_leaf(mut self, leaf: u32, regs: CpuidRegisters) -> Self {
        self.leaves.retain(|(l, _)| *l != leaf);
        self.leaves.push((leaf, regs));
        self
    }

    /// Answer the vendor leaf as "GenuineIntel" with the given highest leaf.
    #[must_use]
    pub fn with_intel_vendor(self, max_leaf: u32) -> Self {
        self.with_leaf(
            LEAF_VENDOR,
            CpuidRegisters {
                eax: max_leaf,
                ebx: INTEL_EBX,
                ecx: INTEL_ECX,
                edx: INTEL_EDX,
            },
        )
    }

    /// Answer the frequency leaf with a base frequency in MHz.
    #[must_use]
    pub fn with_base_mhz(self, mhz: u32) -> Self {
        self.with_leaf(
            LEAF_FREQUENCY,
            CpuidRegisters {
                eax: mhz,
                ..CpuidRegisters::default()
            },
        )
    }

    /// Answer the extended leaves with a brand string (padded with NULs).
    #[must_use]
    pub fn with_brand(mut self, brand: &str) -> Self {
        let mut bytes = [0u8; 48];
        let n = brand.len().min(48);
        bytes[..n].copy_from_slice(&brand.as_bytes()[..n]);

        self = self.with_leaf(
            LEAF_EXTENDED_MAX,
            CpuidRegisters {
                eax: LEAF_BRAND_LAST,
                ..CpuidRegisters::default()
            },
        );
        for (chunk, leaf) in bytes.chunks_exact(16).zip(LEAF_BRAND_FIRST..=LEAF_BRAND_LAST) {
            let reg = |i: usize| {
                u32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]])
            };
            self = self.with_leaf(
                leaf,
                CpuidRegisters {
                    eax: reg(0),
                    ebx: reg(4),
                    ecx: reg(8),
                    edx: reg(12),
                },
            );
        }
        self
    }
}

impl CpuidSource for StaticCpuid {
    fn cpuid(&self, leaf: u32) -> Option<CpuidRegisters> {
        self.leaves
            .iter()
            .find(|(l, _)| *l == leaf)
            .map(|(_, regs)| *regs)
    }
}
