//! Kernel variants and the policy that picks one for the running CPU.
//!
//! 64-bit ARM has 32 vector registers, enough for an 8x12 accumulator tile.
//! 32-bit ARM has 16, so it uses one of two smaller tiles whose best choice
//! depends on the core's pipeline.

use std::fmt;

/// Register tile shape used by the packers and the micro-kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelVariant {
    /// 8 rows x 12 columns, the 64-bit path.
    Tile8x12,
    /// 6 rows x 8 columns, the 32-bit path for most cores.
    Tile6x8,
    /// 4 rows x 8 columns, the 32-bit path for Cortex-A73.
    Tile4x8,
}

impl KernelVariant {
    pub const ALL: [KernelVariant; 3] = [
        KernelVariant::Tile8x12,
        KernelVariant::Tile6x8,
        KernelVariant::Tile4x8,
    ];

    /// Rows per packed A group (tile height).
    #[inline(always)]
    pub const fn tile_rows(self) -> usize {
        match self {
            KernelVariant::Tile8x12 => 8,
            KernelVariant::Tile6x8 => 6,
            KernelVariant::Tile4x8 => 4,
        }
    }

    /// Columns per packed B group (tile width).
    #[inline(always)]
    pub const fn tile_cols(self) -> usize {
        match self {
            KernelVariant::Tile8x12 => 12,
            KernelVariant::Tile6x8 | KernelVariant::Tile4x8 => 8,
        }
    }
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.tile_rows(), self.tile_cols())
    }
}

/// ARM core family, as reported by the "CPU part" field of `/proc/cpuinfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreKind {
    CortexA53,
    CortexA55,
    CortexA57,
    CortexA72,
    CortexA73,
    CortexA75,
    CortexA76,
    CortexA77,
    CortexA78,
    CortexX1,
    /// An ARM part number this crate has no name for.
    Other(u16),
    /// Not an ARM CPU, or the part could not be read.
    Unknown,
}

impl CoreKind {
    /// Maps an ARM primary part number to a core.
    pub fn from_part(part: u16) -> Self {
        match part {
            0xd03 => CoreKind::CortexA53,
            0xd05 => CoreKind::CortexA55,
            0xd07 => CoreKind::CortexA57,
            0xd08 => CoreKind::CortexA72,
            0xd09 => CoreKind::CortexA73,
            0xd0a => CoreKind::CortexA75,
            0xd0b => CoreKind::CortexA76,
            0xd0d => CoreKind::CortexA77,
            0xd41 => CoreKind::CortexA78,
            0xd44 => CoreKind::CortexX1,
            other => CoreKind::Other(other),
        }
    }

    /// Parses the contents of `/proc/cpuinfo`.
    ///
    /// Big.LITTLE systems list several parts; the first one wins, which is
    /// what the kernel reports for cpu0.
    pub fn from_cpuinfo(cpuinfo: &str) -> Self {
        cpuinfo
            .lines()
            .filter_map(|line| line.split_once(':'))
            .filter(|(key, _)| key.trim().eq_ignore_ascii_case("cpu part"))
            .find_map(|(_, value)| {
                let value = value.trim();
                let digits = value
                    .strip_prefix("0x")
                    .or_else(|| value.strip_prefix("0X"))
                    .unwrap_or(value);
                u16::from_str_radix(digits, 16).ok()
            })
            .map(CoreKind::from_part)
            .unwrap_or(CoreKind::Unknown)
    }

    /// Detects the core of the running CPU.
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
                return Self::from_cpuinfo(&cpuinfo);
            }
        }
        CoreKind::Unknown
    }
}

/// Chooses a kernel variant for a core.
///
/// Any `Fn(CoreKind) -> KernelVariant` closure is a policy, so callers can
/// plug their own measurements in without a new type.
pub trait VariantPolicy: Send + Sync {
    fn select(&self, core: CoreKind) -> KernelVariant;
}

impl<F> VariantPolicy for F
where
    F: Fn(CoreKind) -> KernelVariant + Send + Sync,
{
    fn select(&self, core: CoreKind) -> KernelVariant {
        self(core)
    }
}

/// 8x12 on 64-bit targets; on 32-bit targets 4x8 for Cortex-A73 and 6x8
/// for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultPolicy {
    pub wide_registers: bool,
}

impl DefaultPolicy {
    pub const fn new(wide_registers: bool) -> Self {
        Self { wide_registers }
    }
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        Self::new(cfg!(target_pointer_width = "64"))
    }
}

impl VariantPolicy for DefaultPolicy {
    fn select(&self, core: CoreKind) -> KernelVariant {
        if self.wide_registers {
            KernelVariant::Tile8x12
        } else if core == CoreKind::CortexA73 {
            KernelVariant::Tile4x8
        } else {
            KernelVariant::Tile6x8
        }
    }
}

/// Always returns the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPolicy(pub KernelVariant);

impl VariantPolicy for FixedPolicy {
    fn select(&self, _core: CoreKind) -> KernelVariant {
        self.0
    }
}
