//! Blocking driver: `C = act(beta * C + A * B + bias)` over a packed A.
//!
//! N is cut into column blocks sized so that one block of packed B, one A
//! group and one output strip fit in L2. For each block, B is packed into the
//! context workspace on the calling thread, then the row tiles of C are
//! spread over the worker pool. Each task owns whole rows of C, so tasks
//! never write to the same memory.

use std::ops::Range;

use crate::arch::KernelVariant;
use crate::context::{Context, Executor};
use crate::error::Result;
use crate::kernel::{
    Epilogue, Kernel4x8, Kernel6x8, Kernel8x12, MicroKernel, TileRows, MAX_MR, MAX_NR,
};
use crate::matrix::MatrixView;
use crate::pack::{a::pack_a, b::pack_b};

/// L2 size assumed when the context has no hint.
pub const DEFAULT_L2_BYTES: usize = 512 * 1024;

/// `|beta| <= 1e-8` means "overwrite C without reading it".
pub const BETA_EPSILON: f32 = 1e-8;

/// Width of each column block.
///
/// Starts from the largest multiple of `nr` for which
/// `mr * x + mr * k + x * k` floats fit in L2, then spreads N evenly over
/// the resulting number of blocks.
pub fn column_block_width(l2_bytes: usize, mr: usize, nr: usize, k: usize, n: usize) -> usize {
    let l2 = if l2_bytes == 0 { DEFAULT_L2_BYTES } else { l2_bytes };
    let floats = l2 / std::mem::size_of::<f32>();
    let fit = floats.saturating_sub(mr * k) / (k + mr);
    let fit = (fit / nr * nr).max(nr);
    let blocks = n.div_ceil(fit).max(1);
    n.div_ceil(blocks).next_multiple_of(nr).max(nr)
}

/// Arguments of one GEMM call on an already packed A.
///
/// `b` is stored K x N, or N x K when `trans_b` is set. `c` points at an
/// `m x n` matrix with row stride `ldc`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct GemmArgs<'a> {
    pub trans_b: bool,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub packed_a: &'a [f32],
    pub b: MatrixView<'a>,
    pub c: *mut f32,
    pub ldc: usize,
    pub beta: f32,
    pub bias: Option<&'a [f32]>,
    pub relu: bool,
}

pub(crate) type PackAFn =
    fn(&Executor, &mut [f32], MatrixView<'_>, f32, Range<usize>, Range<usize>, bool);

pub(crate) type GemmFn = unsafe fn(&mut Context, &GemmArgs<'_>) -> Result<()>;

/// Packer and driver for one kernel variant, resolved once per context.
#[derive(Clone, Copy)]
pub(crate) struct Dispatch {
    pub pack_a: PackAFn,
    pub gemm: GemmFn,
}

impl Dispatch {
    pub(crate) fn for_variant(variant: KernelVariant) -> Self {
        match variant {
            KernelVariant::Tile8x12 => Self {
                pack_a: pack_a::<8>,
                gemm: sgemm_prepack::<Kernel8x12, 12>,
            },
            KernelVariant::Tile6x8 => Self {
                pack_a: pack_a::<6>,
                gemm: sgemm_prepack::<Kernel6x8, 8>,
            },
            KernelVariant::Tile4x8 => Self {
                pack_a: pack_a::<4>,
                gemm: sgemm_prepack::<Kernel4x8, 8>,
            },
        }
    }
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch").finish_non_exhaustive()
    }
}

/// Output pointer shared by the row-tile tasks.
#[derive(Clone, Copy)]
struct SyncPtr(*mut f32);

// Tasks write disjoint rows through it.
unsafe impl Send for SyncPtr {}
unsafe impl Sync for SyncPtr {}

impl SyncPtr {
    #[inline(always)]
    fn get(self) -> *mut f32 {
        self.0
    }
}

/// One column block, as seen by the row-tile tasks.
struct ColumnBlock<'a> {
    packed_a: &'a [f32],
    panel: &'a [f32],
    m: usize,
    k: usize,
    /// First column of the block.
    x0: usize,
    /// Column groups in the block.
    groups: usize,
    /// Valid columns in the last group, `1..=NR`.
    remain: usize,
    c: SyncPtr,
    ldc: usize,
    bias: Option<&'a [f32]>,
    beta: Option<f32>,
    relu: bool,
}

/// Runs the micro-kernel over every column group of one row tile.
///
/// # Safety
///
/// `block` must describe a valid packed A, a packed B panel for the block and
/// an output matrix covering rows `0..m` and the block's columns.
#[inline(always)]
unsafe fn run_row_tile<K: MicroKernel>(block: &ColumnBlock<'_>, tile: usize) {
    let (mr, nr) = (K::MR, K::NR);
    let row0 = tile * mr;
    let rows_valid = mr.min(block.m - row0);

    // Padding rows keep a zero bias.
    let mut bias = [0.0f32; MAX_MR];
    if let Some(src) = block.bias {
        bias[..rows_valid].copy_from_slice(&src[row0..row0 + rows_valid]);
    }
    let epilogue = Epilogue {
        bias,
        beta: block.beta,
        relu: block.relu,
    };

    // Rows past M, and the whole tile when its columns run past the block,
    // are computed here and only the valid part is copied out.
    let mut landing_buf = [[0.0f32; MAX_NR]; MAX_MR];
    let landing = landing_buf.as_mut_ptr().cast::<f32>();

    let c = block.c.get();
    let a = block.packed_a.as_ptr().add(tile * mr * block.k);

    for j in 0..block.groups {
        let col = block.x0 + j * nr;
        let b = block.panel.as_ptr().add(j * nr * block.k);
        let width = if j + 1 == block.groups { block.remain } else { nr };
        let partial = width < nr;

        let mut rows: TileRows = [landing; MAX_MR];
        for (r, row) in rows.iter_mut().enumerate().take(mr) {
            *row = if r < rows_valid && !partial {
                c.add((row0 + r) * block.ldc + col)
            } else {
                landing.add(r * MAX_NR)
            };
        }

        if partial && block.beta.is_some() {
            for r in 0..rows_valid {
                let src = c.add((row0 + r) * block.ldc + col);
                std::ptr::copy_nonoverlapping(src, landing.add(r * MAX_NR), width);
            }
        }

        K::run(block.k, a, b, &rows, &epilogue);

        if partial {
            for r in 0..rows_valid {
                let dst = c.add((row0 + r) * block.ldc + col);
                std::ptr::copy_nonoverlapping(landing.add(r * MAX_NR), dst, width);
            }
        }
    }
}

/// Blocked GEMM on a packed A for kernel `K` (`NR` is `K::NR`).
///
/// # Safety
///
/// * `args.packed_a` holds `packed_len(K::MR, m, k)` floats packed for `K`.
/// * `args.b` covers the K x N (or N x K) operand.
/// * `args.c` is valid for reads and writes of an `m x n` matrix with row
///   stride `args.ldc >= n`, and nothing else accesses it during the call.
/// * `args.bias`, when present, holds at least `m` values.
pub(crate) unsafe fn sgemm_prepack<K: MicroKernel, const NR: usize>(
    ctx: &mut Context,
    args: &GemmArgs<'_>,
) -> Result<()> {
    debug_assert_eq!(NR, K::NR);
    debug_assert_eq!(ctx.variant, K::VARIANT);
    let GemmArgs {
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
        relu,
    } = *args;
    if m == 0 || n == 0 {
        return Ok(());
    }

    let Context {
        cache_size,
        executor,
        workspace,
        ..
    } = ctx;

    let x_block = column_block_width(*cache_size, K::MR, NR, k, n);
    let workspace = workspace.reserve(x_block * k)?;
    let beta = (beta.abs() > BETA_EPSILON).then_some(beta);
    let tiles = m.div_ceil(K::MR);
    let c = SyncPtr(c);

    for x0 in (0..n).step_by(x_block) {
        let xmax = (x0 + x_block).min(n);
        let groups = (xmax - x0).div_ceil(NR);
        let remain = xmax - x0 - (groups - 1) * NR;
        log::trace!(
            "column block {x0}..{xmax}: {groups} groups of {NR}, {tiles} row tiles of {}",
            K::MR
        );

        let panel = &mut workspace[..groups * NR * k];
        pack_b::<NR>(panel, &b, 0..k, x0..xmax, trans_b);

        let block = ColumnBlock {
            packed_a,
            panel,
            m,
            k,
            x0,
            groups,
            remain,
            c,
            ldc,
            bias,
            beta,
            relu,
        };
        executor.for_each_index(tiles, |tile| {
            // SAFETY: tile < tiles, and each tile writes only its own rows.
            unsafe { run_row_tile::<K>(&block, tile) }
        });
    }
    Ok(())
}
