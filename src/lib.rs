//! Packed single-precision GEMM for ARM.
//!
//! Computes `C = act(beta * C + A * B + bias)` with:
//!
//! * a one-time packing of A into row groups matching the kernel's tile
//!   height ([`prepack_a`]), reusable across calls and threads,
//! * per-call packing of B into column groups sized to the L2 cache,
//! * register-tiled NEON micro-kernels (8x12 on AArch64, 6x8 or 4x8 for
//!   32-bit cores) with bias, beta and ReLU fused into the tile,
//! * fork-join parallelism over row tiles on a rayon pool.
//!
//! The kernel variant is chosen once per [`Context`]. On targets without NEON
//! the same kernels run on a portable 4-lane vector type.

pub mod api;
pub mod arch;
pub mod buffer;
pub mod context;
pub(crate) mod driver;
pub mod error;
pub mod kernel;
pub mod matrix;
pub mod pack;
pub mod reference;
pub mod simd;

pub use api::{
    packed_a_len, prepack_a, prepack_a_grouped, prepack_a_ndarray, prepack_a_range,
    prepack_a_raw, sgemm, sgemm_ndarray, sgemm_prepack_raw, Activation, Fusion, PackedA,
    PackedGroups, PackedView,
};
pub use arch::{CoreKind, DefaultPolicy, FixedPolicy, KernelVariant, VariantPolicy};
pub use context::{Context, ContextBuilder};
pub use driver::{column_block_width, BETA_EPSILON, DEFAULT_L2_BYTES};
pub use error::{GemmError, Result};
pub use matrix::{MatrixView, MatrixViewMut};
pub use reference::sgemm_reference;
