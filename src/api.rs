//! Public entry points.
//!
//! The usual flow packs A once and reuses it across many products:
//!
//! ```
//! use packed_sgemm::{prepack_a, sgemm, Context, Fusion, MatrixView, MatrixViewMut};
//!
//! let mut ctx = Context::builder().threads(1).build().unwrap();
//! let weights = vec![1.0f32; 3 * 4]; // M = 3, K = 4
//! let input = vec![0.5f32; 4 * 5]; // K = 4, N = 5
//! let mut output = vec![0.0f32; 3 * 5];
//!
//! let a = MatrixView::contiguous(&weights, 3, 4).unwrap();
//! let packed = prepack_a(&ctx, &a, 1.0, false).unwrap();
//!
//! let b = MatrixView::contiguous(&input, 4, 5).unwrap();
//! let mut c = MatrixViewMut::contiguous(&mut output, 3, 5).unwrap();
//! sgemm(&mut ctx, false, &packed, &b, &mut c, &Fusion::default()).unwrap();
//! assert!(output.iter().all(|&x| x == 2.0));
//! ```
//!
//! Every checked function validates shapes once and then runs the unchecked
//! engine. The `_raw` functions skip validation entirely.

use std::ops::Range;

use ndarray::{Array2, ArrayView2, ArrayViewMut2};

use crate::arch::KernelVariant;
use crate::buffer::AlignedBuffer;
use crate::context::Context;
use crate::driver::GemmArgs;
use crate::error::{shape_error, GemmError, Result};
use crate::matrix::{MatrixView, MatrixViewMut};
use crate::pack::a::{packed_len, unpack};

/// Activation applied after bias and accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
    #[default]
    None,
    Relu,
}

/// What to fuse into a GEMM: `C = act(beta * C + A * B + bias)`.
///
/// The default overwrites C with `A * B`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fusion<'a> {
    /// Scale of the existing output; `|beta| <= 1e-8` leaves C unread.
    pub beta: f32,
    /// One value per output row.
    pub bias: Option<&'a [f32]>,
    pub activation: Activation,
}

impl<'a> Fusion<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    pub fn bias(mut self, bias: &'a [f32]) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn relu(mut self) -> Self {
        self.activation = Activation::Relu;
        self
    }
}

/// Floats a packed A of `m x k` takes for `variant`.
#[inline(always)]
pub const fn packed_a_len(variant: KernelVariant, m: usize, k: usize) -> usize {
    packed_len(variant.tile_rows(), m, k)
}

/// Borrowed packed A: the buffer plus the shape it was packed for.
#[derive(Debug, Clone, Copy)]
pub struct PackedView<'a> {
    data: &'a [f32],
    variant: KernelVariant,
    rows: usize,
    depth: usize,
}

impl<'a> PackedView<'a> {
    /// Wraps a caller-managed packed buffer, e.g. one filled by [`prepack_a_raw`].
    pub fn new(data: &'a [f32], variant: KernelVariant, rows: usize, depth: usize) -> Result<Self> {
        let needed = packed_a_len(variant, rows, depth);
        if data.len() < needed {
            return Err(shape_error(format!(
                "packed A of {rows}x{depth} for {variant} needs {needed} floats, got {}",
                data.len()
            )));
        }
        Ok(Self {
            data: &data[..needed],
            variant,
            rows,
            depth,
        })
    }

    pub fn as_slice(&self) -> &'a [f32] {
        self.data
    }

    pub fn variant(&self) -> KernelVariant {
        self.variant
    }

    /// Logical rows (M).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Logical depth (K).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Rows including the zero padding of the last group.
    pub fn padded_rows(&self) -> usize {
        self.rows.next_multiple_of(self.variant.tile_rows())
    }

    /// Packed value for `(row, k)`; rows past `rows()` read as zero.
    ///
    /// # Panics
    ///
    /// When `row >= padded_rows()` or `k >= depth()`.
    pub fn get(&self, row: usize, k: usize) -> f32 {
        assert!(row < self.padded_rows() && k < self.depth, "({row}, {k}) out of range");
        let tile = self.variant.tile_rows();
        self.data[(row / tile) * tile * self.depth + k * tile + row % tile]
    }

    /// Rebuilds the row-major `rows x depth` matrix (alpha included).
    pub fn unpack(&self) -> Vec<f32> {
        unpack(self.data, self.variant.tile_rows(), self.rows, self.depth)
    }
}

/// Packed A owned in an aligned buffer.
///
/// Read-only once built, so it can be cached and shared between threads and
/// GEMM calls.
#[derive(Debug)]
pub struct PackedA {
    data: AlignedBuffer,
    variant: KernelVariant,
    rows: usize,
    depth: usize,
}

impl PackedA {
    pub fn view(&self) -> PackedView<'_> {
        PackedView {
            data: self.data.as_slice(),
            variant: self.variant,
            rows: self.rows,
            depth: self.depth,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice()
    }

    pub fn variant(&self) -> KernelVariant {
        self.variant
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn get(&self, row: usize, k: usize) -> f32 {
        self.view().get(row, k)
    }

    pub fn unpack(&self) -> Vec<f32> {
        self.view().unpack()
    }
}

impl<'a> From<&'a PackedA> for PackedView<'a> {
    fn from(packed: &'a PackedA) -> Self {
        packed.view()
    }
}

/// Several M x K matrices packed into one buffer, as for grouped
/// convolution weights. Group `g` starts at `g * stride()`.
#[derive(Debug)]
pub struct PackedGroups {
    data: AlignedBuffer,
    variant: KernelVariant,
    rows: usize,
    depth: usize,
    stride: usize,
    count: usize,
}

impl PackedGroups {
    /// Floats between the starts of two groups, a multiple of 16.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data.as_slice()
    }

    pub fn group(&self, g: usize) -> Option<PackedView<'_>> {
        if g >= self.count {
            return None;
        }
        let start = g * self.stride;
        let len = packed_a_len(self.variant, self.rows, self.depth);
        Some(PackedView {
            data: &self.data.as_slice()[start..start + len],
            variant: self.variant,
            rows: self.rows,
            depth: self.depth,
        })
    }
}

/// Logical `(rows, cols)` of A given how it is stored.
fn logical_dims(src: &MatrixView<'_>, transpose: bool) -> (usize, usize) {
    if transpose {
        (src.cols(), src.rows())
    } else {
        (src.rows(), src.cols())
    }
}

/// Packs all of `alpha * A` for the context's kernel variant.
///
/// `src` is stored M x K, or K x M when `transpose` is set.
pub fn prepack_a(ctx: &Context, src: &MatrixView<'_>, alpha: f32, transpose: bool) -> Result<PackedA> {
    let (m, k) = logical_dims(src, transpose);
    prepack_a_range(ctx, src, alpha, 0..m, 0..k, transpose)
}

/// Packs `alpha * A[rows, depth]`, where the ranges are logical A coordinates.
pub fn prepack_a_range(
    ctx: &Context,
    src: &MatrixView<'_>,
    alpha: f32,
    rows: Range<usize>,
    depth: Range<usize>,
    transpose: bool,
) -> Result<PackedA> {
    let (m, k) = logical_dims(src, transpose);
    if rows.start > rows.end || rows.end > m || depth.start > depth.end || depth.end > k {
        return Err(shape_error(format!(
            "ranges {rows:?} x {depth:?} fall outside a {m}x{k} matrix"
        )));
    }

    let variant = ctx.variant;
    let mut data = AlignedBuffer::zeroed(packed_a_len(variant, rows.len(), depth.len()))?;
    let (packed_rows, packed_depth) = (rows.len(), depth.len());
    (ctx.dispatch.pack_a)(
        &ctx.executor,
        data.as_mut_slice(),
        *src,
        alpha,
        rows,
        depth,
        transpose,
    );
    Ok(PackedA {
        data,
        variant,
        rows: packed_rows,
        depth: packed_depth,
    })
}

/// Packs `groups` consecutive `m x k` matrices stored back to back in
/// `weights` (each `k x m` when `transpose` is set).
pub fn prepack_a_grouped(
    ctx: &Context,
    weights: &[f32],
    m: usize,
    k: usize,
    groups: usize,
    alpha: f32,
    transpose: bool,
) -> Result<PackedGroups> {
    let group_len = m * k;
    if weights.len() < group_len * groups {
        return Err(shape_error(format!(
            "{groups} groups of {m}x{k} need {} floats, got {}",
            group_len * groups,
            weights.len()
        )));
    }

    let variant = ctx.variant;
    let stride = packed_a_len(variant, m, k).next_multiple_of(16);
    let mut data = AlignedBuffer::zeroed(stride * groups)?;
    if stride > 0 {
        let (rows, cols) = if transpose { (k, m) } else { (m, k) };
        for (g, out) in data.as_mut_slice().chunks_exact_mut(stride).enumerate() {
            let src = MatrixView::contiguous(&weights[g * group_len..(g + 1) * group_len], rows, cols)?;
            (ctx.dispatch.pack_a)(&ctx.executor, out, src, alpha, 0..m, 0..k, transpose);
        }
    }
    Ok(PackedGroups {
        data,
        variant,
        rows: m,
        depth: k,
        stride,
        count: groups,
    })
}

/// Packs an `ndarray` A, copying it to standard layout first if needed.
pub fn prepack_a_ndarray(ctx: &Context, a: ArrayView2<'_, f32>, alpha: f32, transpose: bool) -> Result<PackedA> {
    let a = a.as_standard_layout();
    let (rows, cols) = a.dim();
    let data = a
        .as_slice()
        .ok_or_else(|| shape_error("A is not contiguous after relayout"))?;
    prepack_a(ctx, &MatrixView::contiguous(data, rows, cols)?, alpha, transpose)
}

/// `C = act(beta * C + A * B + bias)` with a packed A.
///
/// B is stored K x N, or N x K when `trans_b` is set. C is M x N.
pub fn sgemm<'a>(
    ctx: &mut Context,
    trans_b: bool,
    a: impl Into<PackedView<'a>>,
    b: &MatrixView<'_>,
    c: &mut MatrixViewMut<'_>,
    fusion: &Fusion<'_>,
) -> Result<()> {
    let a = a.into();
    if a.variant != ctx.variant {
        return Err(GemmError::VariantMismatch {
            packed: a.variant,
            context: ctx.variant,
        });
    }
    let (m, n, k) = (a.rows, c.cols(), a.depth);
    if c.rows() != m {
        return Err(shape_error(format!(
            "C has {} rows but A has {m}",
            c.rows()
        )));
    }
    let (b_rows, b_cols) = if trans_b { (n, k) } else { (k, n) };
    if b.rows() != b_rows || b.cols() != b_cols {
        return Err(shape_error(format!(
            "B is {}x{} but {b_rows}x{b_cols} is needed (trans_b: {trans_b})",
            b.rows(),
            b.cols()
        )));
    }
    if let Some(bias) = fusion.bias {
        if bias.len() < m {
            return Err(shape_error(format!(
                "bias has {} values for {m} rows",
                bias.len()
            )));
        }
    }

    let args = GemmArgs {
        trans_b,
        m,
        n,
        k,
        packed_a: a.data,
        b: *b,
        c: c.as_mut_ptr(),
        ldc: c.ld(),
        beta: fusion.beta,
        bias: fusion.bias,
        relu: fusion.activation == Activation::Relu,
    };
    let gemm = ctx.dispatch.gemm;
    // SAFETY: every shape and length was checked above.
    unsafe { gemm(ctx, &args) }
}

/// [`sgemm`] over `ndarray` views of any memory order.
///
/// Non-standard-layout inputs are copied; a non-standard-layout C is
/// computed into a temporary and assigned back.
pub fn sgemm_ndarray<'a>(
    ctx: &mut Context,
    trans_b: bool,
    a: impl Into<PackedView<'a>>,
    b: ArrayView2<'_, f32>,
    c: &mut ArrayViewMut2<'_, f32>,
    fusion: &Fusion<'_>,
) -> Result<()> {
    let b = b.as_standard_layout();
    let (b_rows, b_cols) = b.dim();
    let b_data = b
        .as_slice()
        .ok_or_else(|| shape_error("B is not contiguous after relayout"))?;
    let b_view = MatrixView::contiguous(b_data, b_rows, b_cols)?;

    let (rows, cols) = c.dim();
    if let Some(data) = c.as_slice_mut() {
        let mut c_view = MatrixViewMut::contiguous(data, rows, cols)?;
        return sgemm(ctx, trans_b, a, &b_view, &mut c_view, fusion);
    }

    let mut tmp = Array2::from_shape_vec((rows, cols), c.iter().copied().collect())
        .map_err(|e| shape_error(e.to_string()))?;
    let data = tmp
        .as_slice_mut()
        .ok_or_else(|| shape_error("temporary C is not contiguous"))?;
    let mut c_view = MatrixViewMut::contiguous(data, rows, cols)?;
    sgemm(ctx, trans_b, a, &b_view, &mut c_view, fusion)?;
    c.assign(&tmp);
    Ok(())
}

/// Packs `alpha * A[m0..mmax, k0..kmax]` into caller memory.
///
/// `src` is stored with row stride `ldin`, as M x K or (with `transpose`)
/// K x M.
///
/// # Safety
///
/// * `dst` must be valid for writes of
///   `packed_a_len(ctx.variant(), mmax - m0, kmax - k0)` floats.
/// * `src` must be valid for reads of the stored matrix up to row `mmax`
///   (or `kmax` when transposed), with `ldin` at least the column end.
/// * `m0 <= mmax` and `k0 <= kmax`.
#[allow(clippy::too_many_arguments)]
pub unsafe fn prepack_a_raw(
    dst: *mut f32,
    src: *const f32,
    alpha: f32,
    ldin: usize,
    m0: usize,
    mmax: usize,
    k0: usize,
    kmax: usize,
    transpose: bool,
    ctx: &Context,
) {
    let len = packed_a_len(ctx.variant, mmax - m0, kmax - k0);
    if len == 0 {
        return;
    }
    let src = if transpose {
        MatrixView::from_raw_parts(src, kmax, mmax, ldin)
    } else {
        MatrixView::from_raw_parts(src, mmax, kmax, ldin)
    };
    let dst = std::slice::from_raw_parts_mut(dst, len);
    (ctx.dispatch.pack_a)(&ctx.executor, dst, src, alpha, m0..mmax, k0..kmax, transpose);
}

/// `C = act(beta * C + A * B + bias)` over raw pointers.
///
/// # Safety
///
/// * `packed_a` holds `packed_a_len(ctx.variant(), m, k)` floats packed by
///   this context's variant.
/// * `b` is readable as K x N (N x K when `trans_b`) with row stride `ldb`.
/// * `c` is readable and writable as M x N with row stride `ldc >= n`, and
///   nothing else touches it during the call.
/// * With `has_bias`, `bias` is readable for `m` floats.
#[allow(clippy::too_many_arguments)]
pub unsafe fn sgemm_prepack_raw(
    trans_b: bool,
    m: usize,
    n: usize,
    k: usize,
    packed_a: *const f32,
    b: *const f32,
    ldb: usize,
    beta: f32,
    c: *mut f32,
    ldc: usize,
    bias: *const f32,
    has_bias: bool,
    has_relu: bool,
    ctx: &mut Context,
) -> Result<()> {
    if m == 0 || n == 0 {
        return Ok(());
    }
    let a_len = packed_a_len(ctx.variant, m, k);
    let packed_a: &[f32] = if a_len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(packed_a, a_len)
    };
    let b = if trans_b {
        MatrixView::from_raw_parts(b, n, k, ldb)
    } else {
        MatrixView::from_raw_parts(b, k, n, ldb)
    };
    let bias = if has_bias {
        Some(std::slice::from_raw_parts(bias, m))
    } else {
        None
    };

    let args = GemmArgs {
        trans_b,
        m,
        n,
        k,
        packed_a,
        b,
        c,
        ldc,
        beta,
        bias,
        relu: has_relu,
    };
    let gemm = ctx.dispatch.gemm;
    gemm(ctx, &args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(variant: KernelVariant) -> Context {
        Context::builder().threads(1).variant(variant).build().unwrap()
    }

    #[test]
    fn test_packed_view_get_reads_padding_as_zero() {
        let ctx = ctx(KernelVariant::Tile4x8);
        let data: Vec<f32> = (1..=10).map(|x| x as f32).collect();
        let a = MatrixView::contiguous(&data, 5, 2).unwrap();
        let packed = prepack_a(&ctx, &a, 1.0, false).unwrap();
        assert_eq!(packed.as_slice().len(), 8 * 2);
        assert_eq!(packed.get(4, 1), 10.0);
        assert_eq!(packed.get(7, 0), 0.0);
        assert_eq!(packed.unpack(), data);
    }

    #[test]
    fn test_range_outside_matrix_is_rejected() {
        let ctx = ctx(KernelVariant::Tile8x12);
        let data = vec![0.0f32; 12];
        let a = MatrixView::contiguous(&data, 3, 4).unwrap();
        assert!(prepack_a_range(&ctx, &a, 1.0, 0..4, 0..4, false).is_err());
        assert!(prepack_a_range(&ctx, &a, 1.0, 0..3, 0..4, true).is_err());
        assert!(prepack_a_range(&ctx, &a, 1.0, 0..4, 0..3, true).is_ok());
    }

    #[test]
    fn test_variant_mismatch_is_rejected() {
        let ctx_a = ctx(KernelVariant::Tile6x8);
        let mut ctx_b = ctx(KernelVariant::Tile4x8);
        let data = vec![1.0f32; 4];
        let a = MatrixView::contiguous(&data, 2, 2).unwrap();
        let packed = prepack_a(&ctx_a, &a, 1.0, false).unwrap();
        let mut out = vec![0.0f32; 4];
        let mut c = MatrixViewMut::contiguous(&mut out, 2, 2).unwrap();
        let err = sgemm(&mut ctx_b, false, &packed, &a, &mut c, &Fusion::default()).unwrap_err();
        assert_eq!(
            err,
            GemmError::VariantMismatch {
                packed: KernelVariant::Tile6x8,
                context: KernelVariant::Tile4x8,
            }
        );
    }

    #[test]
    fn test_shape_checks() {
        let mut ctx = ctx(KernelVariant::Tile8x12);
        let data = vec![1.0f32; 6];
        let a = MatrixView::contiguous(&data, 2, 3).unwrap();
        let packed = prepack_a(&ctx, &a, 1.0, false).unwrap();
        let b = MatrixView::contiguous(&data, 2, 3).unwrap();
        let mut out = vec![0.0f32; 6];
        let mut c = MatrixViewMut::contiguous(&mut out, 2, 3).unwrap();
        // B must be 3xN.
        assert!(sgemm(&mut ctx, false, &packed, &b, &mut c, &Fusion::default()).is_err());
        // As N x K it fits: N = 2 would need C to be 2x2.
        assert!(sgemm(&mut ctx, true, &packed, &b, &mut c, &Fusion::default()).is_err());
        let short_bias = [1.0f32];
        let b = MatrixView::contiguous(&data, 3, 2).unwrap();
        let mut c = MatrixViewMut::contiguous(&mut out, 2, 2).unwrap();
        let fusion = Fusion::new().bias(&short_bias);
        assert!(sgemm(&mut ctx, false, &packed, &b, &mut c, &fusion).is_err());
    }

    #[test]
    fn test_packed_view_new_checks_length() {
        let data = vec![0.0f32; 10];
        assert!(PackedView::new(&data, KernelVariant::Tile4x8, 3, 3).is_err());
        assert!(PackedView::new(&data, KernelVariant::Tile4x8, 2, 2).is_ok());
    }

    #[test]
    fn test_fusion_builder() {
        let bias = [1.0f32];
        let fusion = Fusion::new().beta(2.0).bias(&bias).relu();
        assert_eq!(fusion.beta, 2.0);
        assert_eq!(fusion.bias, Some(&bias[..]));
        assert_eq!(fusion.activation, Activation::Relu);
        assert_eq!(Fusion::default().activation, Activation::None);
    }
}
