//! Register-tiled micro-kernels.
//!
//! A micro-kernel computes one `MR x NR` output tile from a packed A group
//! (`MR` floats per K step) and a packed B group (`NR` floats per K step):
//!
//! ```text
//! C[r][c] = act(bias[r] + beta * C[r][c] + sum_k A[k][r] * B[k][c])
//! ```
//!
//! The tile is held in vector registers for the whole K loop. Output rows are
//! addressed through one pointer each, which lets the driver point rows that
//! fall outside the matrix at a scratch landing buffer.

mod k4x8;
mod k6x8;
mod k8x12;

pub use k4x8::Kernel4x8;
pub use k6x8::Kernel6x8;
pub use k8x12::Kernel8x12;

use crate::arch::KernelVariant;
use crate::simd::{F32x4, LANE_COUNT};

/// Largest tile height of any kernel.
pub const MAX_MR: usize = 8;
/// Largest tile width of any kernel.
pub const MAX_NR: usize = 12;

/// K steps per unrolled round of the inner loop.
pub const KBLOCK: usize = 4;

/// One output pointer per tile row. Only the first `MR` entries are used.
pub type TileRows = [*mut f32; MAX_MR];

/// Work applied around the multiply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epilogue {
    /// Per-row bias, zero for rows without one.
    pub bias: [f32; MAX_MR],
    /// Scale for the existing output, `None` to overwrite it.
    pub beta: Option<f32>,
    /// Clamp the result at zero.
    pub relu: bool,
}

impl Default for Epilogue {
    fn default() -> Self {
        Self {
            bias: [0.0; MAX_MR],
            beta: None,
            relu: false,
        }
    }
}

pub trait MicroKernel {
    const MR: usize;
    const NR: usize;
    const VARIANT: KernelVariant;

    /// Computes one tile.
    ///
    /// # Safety
    ///
    /// * `a` must be readable for `k * MR` floats and `b` for `k * NR` floats.
    /// * `rows[r]` for `r < MR` must be writable for `NR` floats, and readable
    ///   too when `epilogue.beta` is set. Distinct rows must not overlap.
    unsafe fn run(k: usize, a: *const f32, b: *const f32, rows: &TileRows, epilogue: &Epilogue);
}

/// Seeds the accumulators with the bias, then folds in `beta * C`.
///
/// # Safety
///
/// Same row requirements as [`MicroKernel::run`] with `V * 4` columns.
#[inline(always)]
pub(crate) unsafe fn load_accumulators<const R: usize, const V: usize>(
    rows: &TileRows,
    epilogue: &Epilogue,
) -> [[F32x4; V]; R] {
    let mut acc = [[F32x4::zero(); V]; R];
    for (r, row) in acc.iter_mut().enumerate() {
        let bias = F32x4::splat(epilogue.bias[r]);
        match epilogue.beta {
            Some(beta) => {
                let beta = F32x4::splat(beta);
                for (c, v) in row.iter_mut().enumerate() {
                    let old = F32x4::load(rows[r].add(c * LANE_COUNT));
                    *v = bias.fmla(old, beta);
                }
            }
            None => *row = [bias; V],
        }
    }
    acc
}

/// Applies the activation and writes the tile out.
///
/// # Safety
///
/// `rows[r]` for `r < R` must be writable for `V * 4` floats.
#[inline(always)]
pub(crate) unsafe fn store_accumulators<const R: usize, const V: usize>(
    acc: &[[F32x4; V]; R],
    rows: &TileRows,
    relu: bool,
) {
    let zero = F32x4::zero();
    for (r, row) in acc.iter().enumerate() {
        for (c, &v) in row.iter().enumerate() {
            let v = if relu { v.max(zero) } else { v };
            v.store(rows[r].add(c * LANE_COUNT));
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Runs `K` on row-major `a` (MR x k) and `b` (k x NR) against a dense tile.
    pub fn run_dense<K: MicroKernel>(
        a: &[f32],
        b: &[f32],
        k: usize,
        tile: &mut [f32],
        epilogue: &Epilogue,
    ) {
        let (mr, nr) = (K::MR, K::NR);
        let mut packed_a = vec![0.0; mr * k];
        for r in 0..mr {
            for kk in 0..k {
                packed_a[kk * mr + r] = a[r * k + kk];
            }
        }
        let mut rows: TileRows = [std::ptr::null_mut(); MAX_MR];
        let base = tile.as_mut_ptr();
        for (r, row) in rows.iter_mut().enumerate().take(mr) {
            *row = unsafe { base.add(r * nr) };
        }
        unsafe { K::run(k, packed_a.as_ptr(), b.as_ptr(), &rows, epilogue) };
    }

    /// Same tile computed with scalar code.
    pub fn expected<K: MicroKernel>(
        a: &[f32],
        b: &[f32],
        k: usize,
        old: &[f32],
        epilogue: &Epilogue,
    ) -> Vec<f32> {
        let (mr, nr) = (K::MR, K::NR);
        let mut out = vec![0.0; mr * nr];
        for r in 0..mr {
            for c in 0..nr {
                let mut acc = epilogue.bias[r];
                if let Some(beta) = epilogue.beta {
                    acc += beta * old[r * nr + c];
                }
                for kk in 0..k {
                    acc += a[r * k + kk] * b[kk * nr + c];
                }
                out[r * nr + c] = if epilogue.relu { acc.max(0.0) } else { acc };
            }
        }
        out
    }

    pub fn values(len: usize, seed: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (((i * 7 + seed * 13) % 23) as f32 - 11.0) * 0.125)
            .collect()
    }

    pub fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (x, y)) in actual.iter().zip(expected).enumerate() {
            let tol = 1e-5 * y.abs().max(1.0);
            assert!((x - y).abs() <= tol, "index {i}: {x} vs {y}");
        }
    }

    /// Checks every K tail (0..=3 leftover steps) with all epilogue options.
    pub fn check_kernel<K: MicroKernel>() {
        let (mr, nr) = (K::MR, K::NR);
        for k in [0, 1, 2, 3, 4, 5, 7, 8, 13] {
            let a = values(mr * k, k);
            let b = values(k * nr, k + 1);
            let old = values(mr * nr, 3);
            let mut bias = [0.0; MAX_MR];
            for (r, v) in bias.iter_mut().enumerate().take(mr) {
                *v = r as f32 - 2.5;
            }
            for beta in [None, Some(0.5)] {
                for relu in [false, true] {
                    let epilogue = Epilogue { bias, beta, relu };
                    let mut tile = old.clone();
                    run_dense::<K>(&a, &b, k, &mut tile, &epilogue);
                    assert_close(&tile, &expected::<K>(&a, &b, k, &old, &epilogue));
                }
            }
        }
    }
}
