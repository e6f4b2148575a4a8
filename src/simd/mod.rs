//! Vector primitives shared by the packers and the micro-kernels.
//!
//! Only 128-bit vectors are used: every tile shape in this crate (8x12, 6x8,
//! 4x8) is a whole number of 4-lane vectors wide, which is what the NEON
//! register file holds.

pub mod f32x4;

pub use f32x4::{F32x4, LANE_COUNT, NEON_ALIGNMENT};

/// Hints the CPU to pull the cache line holding `ptr` into L1.
///
/// `prfm` never faults, so the address may point past the end of a panel.
#[cfg(neon)]
#[inline(always)]
pub fn prefetch_l1(ptr: *const f32) {
    unsafe {
        std::arch::asm!(
            "prfm pldl1keep, [{0}]",
            in(reg) ptr,
            options(nostack, preserves_flags, readonly)
        );
    }
}

#[cfg(not(neon))]
#[inline(always)]
pub fn prefetch_l1(_ptr: *const f32) {}
