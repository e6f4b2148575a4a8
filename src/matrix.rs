//! Borrowed row-major matrix views with an explicit leading dimension.
//!
//! A view never owns memory. The leading dimension (`ld`, the row stride) may
//! exceed the column count, which lets a view describe a sub-matrix of a
//! larger buffer without copying.

use crate::error::{shape_error, Result};

/// Number of elements a `rows x cols` view with stride `ld` spans.
#[inline(always)]
pub const fn required_len(rows: usize, cols: usize, ld: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        (rows - 1) * ld + cols
    }
}

fn check_shape(len: usize, rows: usize, cols: usize, ld: usize) -> Result<()> {
    if ld < cols {
        return Err(shape_error(format!(
            "leading dimension {ld} is smaller than the column count {cols}"
        )));
    }
    let needed = rows
        .checked_sub(1)
        .and_then(|r| r.checked_mul(ld))
        .and_then(|r| r.checked_add(cols))
        .unwrap_or(0);
    if len < needed {
        return Err(shape_error(format!(
            "buffer of {len} elements cannot hold a {rows}x{cols} matrix with ld {ld} ({needed} needed)"
        )));
    }
    Ok(())
}

/// Immutable `rows x cols` view; element `(i, j)` lives at `i * ld + j`.
#[derive(Clone, Copy, Debug)]
pub struct MatrixView<'a> {
    data: &'a [f32],
    rows: usize,
    cols: usize,
    ld: usize,
}

impl<'a> MatrixView<'a> {
    /// Creates a view after checking that `data` covers every element.
    pub fn new(data: &'a [f32], rows: usize, cols: usize, ld: usize) -> Result<Self> {
        check_shape(data.len(), rows, cols, ld)?;
        Ok(Self {
            data: &data[..required_len(rows, cols, ld)],
            rows,
            cols,
            ld,
        })
    }

    /// Contiguous view (`ld == cols`).
    pub fn contiguous(data: &'a [f32], rows: usize, cols: usize) -> Result<Self> {
        Self::new(data, rows, cols, cols)
    }

    /// Builds a view over raw memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `required_len(rows, cols, ld)` floats
    /// for the lifetime `'a`, and nothing may write to that range meanwhile.
    #[inline(always)]
    pub unsafe fn from_raw_parts(ptr: *const f32, rows: usize, cols: usize, ld: usize) -> Self {
        let len = required_len(rows, cols, ld);
        let data = if len == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(ptr, len)
        };
        Self {
            data,
            rows,
            cols,
            ld,
        }
    }

    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline(always)]
    pub fn ld(&self) -> usize {
        self.ld
    }

    /// Row `i`, exactly `cols` elements long.
    #[inline(always)]
    pub fn row(&self, i: usize) -> &'a [f32] {
        if self.cols == 0 {
            return &[];
        }
        let start = i * self.ld;
        &self.data[start..start + self.cols]
    }

    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        debug_assert!(j < self.cols);
        self.data[i * self.ld + j]
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *const f32 {
        self.data.as_ptr()
    }
}

/// Mutable counterpart of [`MatrixView`].
#[derive(Debug)]
pub struct MatrixViewMut<'a> {
    data: &'a mut [f32],
    rows: usize,
    cols: usize,
    ld: usize,
}

impl<'a> MatrixViewMut<'a> {
    /// Creates a view after checking that `data` covers every element.
    pub fn new(data: &'a mut [f32], rows: usize, cols: usize, ld: usize) -> Result<Self> {
        check_shape(data.len(), rows, cols, ld)?;
        let len = required_len(rows, cols, ld);
        Ok(Self {
            data: &mut data[..len],
            rows,
            cols,
            ld,
        })
    }

    pub fn contiguous(data: &'a mut [f32], rows: usize, cols: usize) -> Result<Self> {
        Self::new(data, rows, cols, cols)
    }

    /// Builds a mutable view over raw memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of
    /// `required_len(rows, cols, ld)` floats for `'a`, with no other access
    /// to that range meanwhile.
    #[inline(always)]
    pub unsafe fn from_raw_parts(ptr: *mut f32, rows: usize, cols: usize, ld: usize) -> Self {
        let len = required_len(rows, cols, ld);
        let data = if len == 0 {
            &mut []
        } else {
            std::slice::from_raw_parts_mut(ptr, len)
        };
        Self {
            data,
            rows,
            cols,
            ld,
        }
    }

    #[inline(always)]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline(always)]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline(always)]
    pub fn ld(&self) -> usize {
        self.ld
    }

    #[inline(always)]
    pub fn row(&self, i: usize) -> &[f32] {
        if self.cols == 0 {
            return &[];
        }
        let start = i * self.ld;
        &self.data[start..start + self.cols]
    }

    #[inline(always)]
    pub fn row_mut(&mut self, i: usize) -> &mut [f32] {
        if self.cols == 0 {
            return &mut [];
        }
        let start = i * self.ld;
        &mut self.data[start..start + self.cols]
    }

    #[inline(always)]
    pub fn get(&self, i: usize, j: usize) -> f32 {
        debug_assert!(j < self.cols);
        self.data[i * self.ld + j]
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *const f32 {
        self.data.as_ptr()
    }

    #[inline(always)]
    pub fn as_mut_ptr(&mut self) -> *mut f32 {
        self.data.as_mut_ptr()
    }

    /// Reborrows as an immutable view.
    pub fn as_view(&self) -> MatrixView<'_> {
        MatrixView {
            data: &*self.data,
            rows: self.rows,
            cols: self.cols,
            ld: self.ld,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strided_view_rows() {
        let data: Vec<f32> = (0..12).map(|x| x as f32).collect();
        // 3x2 view over a 3x4 buffer
        let view = MatrixView::new(&data, 3, 2, 4).unwrap();
        assert_eq!(view.row(0), &[0.0, 1.0]);
        assert_eq!(view.row(2), &[8.0, 9.0]);
        assert_eq!(view.get(1, 1), 5.0);
    }

    #[test]
    fn test_view_does_not_need_trailing_padding() {
        // The last row only needs `cols` elements, not `ld`.
        let data = vec![0.0f32; 2 * 5 + 3];
        assert!(MatrixView::new(&data, 3, 3, 5).is_ok());
        assert!(MatrixView::new(&data[..12], 3, 3, 5).is_err());
    }

    #[test]
    fn test_ld_smaller_than_cols_is_rejected() {
        let data = vec![0.0f32; 16];
        let err = MatrixView::new(&data, 2, 4, 3).unwrap_err();
        assert!(err.to_string().contains("leading dimension"));
    }

    #[test]
    fn test_empty_views() {
        let mut data: Vec<f32> = Vec::new();
        assert!(MatrixView::new(&data, 0, 7, 7).is_ok());
        assert!(MatrixViewMut::new(&mut data, 5, 0, 0).is_ok());
    }

    #[test]
    fn test_row_mut_writes_through() {
        let mut data = vec![0.0f32; 6];
        let mut view = MatrixViewMut::new(&mut data, 2, 2, 3).unwrap();
        view.row_mut(1)[1] = 4.0;
        assert_eq!(view.get(1, 1), 4.0);
        drop(view);
        assert_eq!(data[4], 4.0);
    }
}
