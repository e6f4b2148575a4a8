//! A 4-lane `f32` vector used by the packers and micro-kernels.
//!
//! With the `neon` cfg (emitted by `build.rs` for AArch64 targets) the type
//! wraps `float32x4_t` and every operation lowers to a single NEON
//! instruction. Elsewhere the same API is backed by a plain `[f32; 4]`, so the
//! kernels keep their exact structure and stay testable on any host.

#[cfg(neon)]
use std::arch::aarch64::*;

use std::ops::{Add, Mul};

/// Alignment of packed buffers, one 128-bit vector.
pub const NEON_ALIGNMENT: usize = 16;

pub const LANE_COUNT: usize = 4;

#[cfg(neon)]
type Lanes = float32x4_t;

#[cfg(not(neon))]
type Lanes = [f32; LANE_COUNT];

/// A SIMD vector of 4 32-bit floating point values.
#[derive(Copy, Clone, Debug)]
#[repr(transparent)]
pub struct F32x4 {
    elements: Lanes,
}

impl F32x4 {
    /// Creates a new vector with all elements set to the same value.
    #[inline(always)]
    pub fn splat(value: f32) -> Self {
        #[cfg(neon)]
        let elements = unsafe { vdupq_n_f32(value) };
        #[cfg(not(neon))]
        let elements = [value; LANE_COUNT];
        Self { elements }
    }

    #[inline(always)]
    pub fn zero() -> Self {
        Self::splat(0.0)
    }

    #[inline(always)]
    pub fn from_array(values: [f32; LANE_COUNT]) -> Self {
        // SAFETY: the array provides exactly LANE_COUNT readable floats.
        unsafe { Self::load(values.as_ptr()) }
    }

    #[inline(always)]
    pub fn to_array(self) -> [f32; LANE_COUNT] {
        let mut out = [0.0f32; LANE_COUNT];
        // SAFETY: `out` holds exactly LANE_COUNT writable floats.
        unsafe { self.store(out.as_mut_ptr()) };
        out
    }

    /// Loads 4 consecutive floats. No alignment is required.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of 4 floats.
    #[inline(always)]
    pub unsafe fn load(ptr: *const f32) -> Self {
        #[cfg(neon)]
        let elements = vld1q_f32(ptr);
        #[cfg(not(neon))]
        let elements = std::ptr::read_unaligned(ptr.cast::<[f32; LANE_COUNT]>());
        Self { elements }
    }

    /// Loads the first `size` floats and fills the remaining lanes with zero.
    ///
    /// Never touches memory past `ptr + size`, which makes it the masking
    /// primitive for matrix edges.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `min(size, 4)` floats.
    #[inline(always)]
    pub unsafe fn load_partial(ptr: *const f32, size: usize) -> Self {
        let mut lanes = [0.0f32; LANE_COUNT];
        match size {
            0 => {}
            1 => lanes[0] = *ptr,
            2 => {
                lanes[0] = *ptr;
                lanes[1] = *ptr.add(1);
            }
            3 => {
                lanes[0] = *ptr;
                lanes[1] = *ptr.add(1);
                lanes[2] = *ptr.add(2);
            }
            _ => return Self::load(ptr),
        }
        Self::from_array(lanes)
    }

    /// Stores all 4 lanes.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of 4 floats.
    #[inline(always)]
    pub unsafe fn store(self, ptr: *mut f32) {
        #[cfg(neon)]
        vst1q_f32(ptr, self.elements);
        #[cfg(not(neon))]
        std::ptr::write_unaligned(ptr.cast::<[f32; LANE_COUNT]>(), self.elements);
    }

    /// Stores the first `size` lanes.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for writes of `min(size, 4)` floats.
    #[inline(always)]
    pub unsafe fn store_partial(self, ptr: *mut f32, size: usize) {
        if size >= LANE_COUNT {
            return self.store(ptr);
        }
        let lanes = self.to_array();
        std::ptr::copy_nonoverlapping(lanes.as_ptr(), ptr, size);
    }

    /// `self + b * c`, fused where the hardware allows.
    #[inline(always)]
    pub fn fmla(self, b: Self, c: Self) -> Self {
        #[cfg(neon)]
        let elements = unsafe { vfmaq_f32(self.elements, b.elements, c.elements) };
        #[cfg(not(neon))]
        let elements = std::array::from_fn(|i| self.elements[i] + b.elements[i] * c.elements[i]);
        Self { elements }
    }

    /// `self + b * c[LANE]`: one row of a rank-1 update, broadcasting a lane of `c`.
    #[inline(always)]
    pub fn fmla_lane<const LANE: i32>(self, b: Self, c: Self) -> Self {
        #[cfg(neon)]
        let elements = unsafe { vfmaq_laneq_f32::<LANE>(self.elements, b.elements, c.elements) };
        #[cfg(not(neon))]
        let elements = {
            let scalar = c.elements[LANE as usize];
            std::array::from_fn(|i| self.elements[i] + b.elements[i] * scalar)
        };
        Self { elements }
    }

    /// Lane-wise maximum. `max(x, 0)` is the ReLU clamp.
    #[inline(always)]
    pub fn max(self, other: Self) -> Self {
        #[cfg(neon)]
        let elements = unsafe { vmaxq_f32(self.elements, other.elements) };
        #[cfg(not(neon))]
        let elements = std::array::from_fn(|i| {
            let (a, b) = (self.elements[i], other.elements[i]);
            if a > b {
                a
            } else {
                b
            }
        });
        Self { elements }
    }

    /// Transposes a 4x4 block held as four row vectors.
    #[inline(always)]
    pub fn transpose4(rows: [Self; 4]) -> [Self; 4] {
        #[cfg(neon)]
        let cols = unsafe {
            let [r0, r1, r2, r3] = rows.map(|r| r.elements);
            let t0 = vzip1q_f32(r0, r2);
            let t1 = vzip2q_f32(r0, r2);
            let t2 = vzip1q_f32(r1, r3);
            let t3 = vzip2q_f32(r1, r3);
            [
                vzip1q_f32(t0, t2),
                vzip2q_f32(t0, t2),
                vzip1q_f32(t1, t3),
                vzip2q_f32(t1, t3),
            ]
        };
        #[cfg(not(neon))]
        let cols = {
            let r = rows.map(|r| r.elements);
            std::array::from_fn(|col| std::array::from_fn(|row| r[row][col]))
        };
        cols.map(|elements| Self { elements })
    }
}

impl Add for F32x4 {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        #[cfg(neon)]
        let elements = unsafe { vaddq_f32(self.elements, rhs.elements) };
        #[cfg(not(neon))]
        let elements = std::array::from_fn(|i| self.elements[i] + rhs.elements[i]);
        Self { elements }
    }
}

impl Mul for F32x4 {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self::Output {
        #[cfg(neon)]
        let elements = unsafe { vmulq_f32(self.elements, rhs.elements) };
        #[cfg(not(neon))]
        let elements = std::array::from_fn(|i| self.elements[i] * rhs.elements[i]);
        Self { elements }
    }
}
