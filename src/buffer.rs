//! Aligned, zero-initialised `f32` storage for packed panels and workspaces.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::slice;

use crate::error::{allocation_error, Result};
use crate::simd::f32x4::NEON_ALIGNMENT;

/// A heap-allocated, `NEON_ALIGNMENT`-aligned buffer of `f32`.
///
/// Packed A buffers and the B-panel workspace live here. The memory is
/// zero-initialised on allocation, so padding lanes that are never written
/// read back as `0.0`.
pub struct AlignedBuffer {
    /// Pointer to the first element, dangling when `len == 0`.
    ptr: NonNull<f32>,
    /// Number of `f32` elements.
    len: usize,
    /// The layout used for allocation. Storing it guarantees that deallocation
    /// is performed with the exact same layout.
    layout: Layout,
}

// The buffer uniquely owns its allocation, like a `Box<[f32]>`.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates `len` zeroed floats aligned to [`NEON_ALIGNMENT`] bytes.
    ///
    /// # Errors
    ///
    /// Returns an allocation error if the byte size overflows or the
    /// allocator returns null.
    pub fn zeroed(len: usize) -> Result<Self> {
        let size_bytes = len
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| allocation_error(len, "size overflows usize"))?;

        let layout = Layout::from_size_align(size_bytes, NEON_ALIGNMENT)
            .map_err(|e| allocation_error(len, e.to_string()))?;

        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
                layout,
            });
        }

        // SAFETY: the layout has a non-zero size.
        let raw_ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw_ptr.cast::<f32>())
            .ok_or_else(|| allocation_error(len, "allocator returned null"))?;

        Ok(Self { ptr, len, layout })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[f32] {
        // SAFETY: `ptr` is valid for `len` initialised elements (or dangling with len 0).
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // Deallocating with a zero-sized layout is undefined behavior.
        if self.layout.size() > 0 {
            unsafe {
                alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout);
            }
        }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("align", &self.layout.align())
            .finish()
    }
}
