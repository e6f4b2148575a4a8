//! Panel packing.
//!
//! Both operands are rewritten into "strips": for a strip of width `W`,
//! element `(k, lane)` lands at `k * W + lane`, so the micro-kernel reads one
//! contiguous run of `W` floats per step of the K loop. Lanes past the edge of
//! the matrix are written as zero, never left stale.
//!
//! Two primitives cover all four (operand, transpose) combinations:
//!
//! * [`interleave_rows`] when each lane is a contiguous source row
//!   (A as stored, B transposed),
//! * [`copy_strip`] when each K step is a contiguous source row
//!   (A transposed, B as stored).

pub mod a;
pub mod b;

use crate::matrix::MatrixView;
use crate::simd::{F32x4, LANE_COUNT};

/// `|alpha - 1| <= 1e-8` means "copy without scaling".
pub(crate) const ALPHA_EPSILON: f32 = 1e-8;

/// The multiplier packing has to apply, if any.
#[inline(always)]
pub(crate) fn alpha_scale(alpha: f32) -> Option<f32> {
    ((alpha - 1.0).abs() > ALPHA_EPSILON).then_some(alpha)
}

#[inline(always)]
fn scaled(v: F32x4, scale: Option<f32>) -> F32x4 {
    match scale {
        Some(s) => v * F32x4::splat(s),
        None => v,
    }
}

/// Interleaves `W` source rows lane-wise into `out`.
///
/// `lines[lane]` holds the `len` values of that lane along K; lanes past the
/// matrix edge point at a zero row. Full groups of four K steps go through an
/// in-register 4x4 transpose, the leftover steps are copied one by one.
///
/// `out` must hold at least `len * W` floats.
pub(crate) fn interleave_rows<const W: usize>(
    lines: &[&[f32]; W],
    len: usize,
    scale: Option<f32>,
    out: &mut [f32],
) {
    debug_assert!(out.len() >= len * W);
    debug_assert!(lines.iter().all(|line| line.len() >= len));

    let k_main = len - len % LANE_COUNT;
    for quad in (0..W).step_by(LANE_COUNT) {
        let width = LANE_COUNT.min(W - quad);

        for k in (0..k_main).step_by(LANE_COUNT) {
            // Rows of the 4x4 block are lanes, columns are K steps.
            let block: [F32x4; LANE_COUNT] = std::array::from_fn(|i| {
                if i < width {
                    // SAFETY: every line holds at least `len` values and k + 4 <= k_main <= len.
                    unsafe { F32x4::load(lines[quad + i].as_ptr().add(k)) }
                } else {
                    F32x4::zero()
                }
            });
            let steps = F32x4::transpose4(block);
            for (dk, step) in steps.into_iter().enumerate() {
                let at = (k + dk) * W + quad;
                // SAFETY: at + width <= (k + dk + 1) * W <= len * W <= out.len().
                unsafe { scaled(step, scale).store_partial(out.as_mut_ptr().add(at), width) };
            }
        }

        for k in k_main..len {
            for lane in quad..quad + width {
                let v = lines[lane][k];
                out[k * W + lane] = scale.map_or(v, |s| v * s);
            }
        }
    }
}

/// Copies `len` consecutive source rows, starting at `row0`, into a strip of
/// width `W` taken from columns `col0..col0 + valid`.
///
/// Columns from `valid` up to `W` are zero-filled through partial loads, so
/// nothing past the matrix edge is read.
pub(crate) fn copy_strip<const W: usize>(
    src: &MatrixView<'_>,
    row0: usize,
    len: usize,
    col0: usize,
    valid: usize,
    scale: Option<f32>,
    out: &mut [f32],
) {
    debug_assert!(valid <= W);
    debug_assert!(out.len() >= len * W);

    for k in 0..len {
        let row = &src.row(row0 + k)[col0..col0 + valid];
        let dst = &mut out[k * W..(k + 1) * W];
        for quad in (0..W).step_by(LANE_COUNT) {
            let width = LANE_COUNT.min(W - quad);
            let present = valid.saturating_sub(quad).min(LANE_COUNT);
            let v = if present == 0 {
                F32x4::zero()
            } else {
                // SAFETY: `row` holds `valid >= quad + present` values.
                unsafe { F32x4::load_partial(row.as_ptr().add(quad), present) }
            };
            // SAFETY: quad + width <= W == dst.len().
            unsafe { scaled(v, scale).store_partial(dst.as_mut_ptr().add(quad), width) };
        }
    }
}
