//! B-side panel loader.
//!
//! Loads one column block of B into the workspace. Column group `j` starts
//! at `j * NR * K` and stores, for each `k`, the `NR` values
//! `B[k][n0 + j * NR + lane]`. Columns past the block end are zero.
//!
//! Runs once per column block inside a GEMM call and is never cached.

use std::ops::Range;

use super::{copy_strip, interleave_rows};
use crate::matrix::MatrixView;

/// Floats needed for a column block of `cols` columns.
#[inline(always)]
pub const fn packed_len(tile_cols: usize, cols: usize, k: usize) -> usize {
    cols.div_ceil(tile_cols) * tile_cols * k
}

/// Loads `B[depth, cols]` into `out`.
///
/// When `transpose` is false `src` is stored K x N; when true it is stored
/// N x K and `cols` indexes its rows.
pub(crate) fn pack_b<const NR: usize>(
    out: &mut [f32],
    src: &MatrixView<'_>,
    depth: Range<usize>,
    cols: Range<usize>,
    transpose: bool,
) {
    let k = depth.len();
    let group_len = NR * k;
    if cols.is_empty() || group_len == 0 {
        return;
    }
    let zeros = if transpose { vec![0.0f32; k] } else { Vec::new() };

    for (j, strip) in out[..packed_len(NR, cols.len(), k)]
        .chunks_exact_mut(group_len)
        .enumerate()
    {
        let col0 = cols.start + j * NR;
        let valid = NR.min(cols.end - col0);
        if transpose {
            let lines: [&[f32]; NR] = std::array::from_fn(|lane| {
                if lane < valid {
                    &src.row(col0 + lane)[depth.clone()]
                } else {
                    zeros.as_slice()
                }
            });
            interleave_rows::<NR>(&lines, k, None, strip);
        } else {
            copy_strip::<NR>(src, depth.start, k, col0, valid, None, strip);
        }
    }
}
