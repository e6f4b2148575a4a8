//! A-side panel packer.
//!
//! The packed A buffer holds `ceil(M / MR)` row groups back to back. Group
//! `g` starts at `g * MR * K` and stores, for each `k`, the `MR` values
//! `A[g * MR + lane][k]`. Rows past `M` are zero.

use std::ops::Range;

use super::{alpha_scale, copy_strip, interleave_rows};
use crate::context::Executor;
use crate::matrix::MatrixView;

/// Floats needed to pack `m x k` with row groups of `tile_rows`.
#[inline(always)]
pub const fn packed_len(tile_rows: usize, m: usize, k: usize) -> usize {
    m.div_ceil(tile_rows) * tile_rows * k
}

/// Packs `alpha * A[rows, depth]` into `out`, one row group per task.
///
/// When `transpose` is false `src` is stored M x K; when true it is stored
/// K x M and `rows` indexes its columns. The caller guarantees that both
/// ranges lie inside `src` and that `out` holds
/// `packed_len(MR, rows.len(), depth.len())` floats.
pub(crate) fn pack_a<const MR: usize>(
    executor: &Executor,
    out: &mut [f32],
    src: MatrixView<'_>,
    alpha: f32,
    rows: Range<usize>,
    depth: Range<usize>,
    transpose: bool,
) {
    let (m, k) = (rows.len(), depth.len());
    let group_len = MR * k;
    if m == 0 || group_len == 0 {
        return;
    }
    let groups = m.div_ceil(MR);
    let scale = alpha_scale(alpha);
    let zeros = if transpose { Vec::new() } else { vec![0.0f32; k] };

    log::debug!(
        "packing A: {m}x{k} (transposed: {transpose}) into {groups} groups of {MR} rows"
    );

    executor.for_each_chunk(&mut out[..groups * group_len], group_len, |g, strip| {
        let row0 = rows.start + g * MR;
        let valid = MR.min(rows.end - row0);
        if transpose {
            copy_strip::<MR>(&src, depth.start, k, row0, valid, scale, strip);
        } else {
            // Lanes past the last row read the shared zero row.
            let lines: [&[f32]; MR] = std::array::from_fn(|lane| {
                if lane < valid {
                    &src.row(row0 + lane)[depth.clone()]
                } else {
                    zeros.as_slice()
                }
            });
            interleave_rows::<MR>(&lines, k, scale, strip);
        }
    });
}

/// Rebuilds the row-major `m x k` matrix a packed buffer was made from.
pub(crate) fn unpack(packed: &[f32], tile_rows: usize, m: usize, k: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; m * k];
    for i in 0..m {
        let (group, lane) = (i / tile_rows, i % tile_rows);
        let base = group * tile_rows * k;
        for kk in 0..k {
            out[i * k + kk] = packed[base + kk * tile_rows + lane];
        }
    }
    out
}
