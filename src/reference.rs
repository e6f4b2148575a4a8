//! Straightforward triple-loop GEMM with the same fusion semantics as the
//! packed engine. Slow; meant for validating results.

use crate::api::{Activation, Fusion};
use crate::driver::BETA_EPSILON;
use crate::error::{shape_error, Result};
use crate::matrix::{MatrixView, MatrixViewMut};

/// `C = act(beta * C + alpha * op(A) * op(B) + bias)`.
///
/// `op(A)` is `A` or its transpose according to `trans_a`, likewise for B.
/// Sums are accumulated in `f64`. As in the packed engine, C is not read when
/// `|beta| <= 1e-8`.
pub fn sgemm_reference(
    a: &MatrixView<'_>,
    trans_a: bool,
    alpha: f32,
    b: &MatrixView<'_>,
    trans_b: bool,
    c: &mut MatrixViewMut<'_>,
    fusion: &Fusion<'_>,
) -> Result<()> {
    let (m, n) = (c.rows(), c.cols());
    let (a_rows, k) = if trans_a {
        (a.cols(), a.rows())
    } else {
        (a.rows(), a.cols())
    };
    let (b_rows, b_cols) = if trans_b {
        (b.cols(), b.rows())
    } else {
        (b.rows(), b.cols())
    };
    if a_rows != m || b_rows != k || b_cols != n {
        return Err(shape_error(format!(
            "cannot multiply {a_rows}x{k} by {b_rows}x{b_cols} into {m}x{n}"
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

    let at = |i: usize, p: usize| if trans_a { a.get(p, i) } else { a.get(i, p) };
    let bt = |p: usize, j: usize| if trans_b { b.get(j, p) } else { b.get(p, j) };
    let has_beta = fusion.beta.abs() > BETA_EPSILON;

    for i in 0..m {
        let bias = fusion.bias.map_or(0.0, |bias| bias[i] as f64);
        for j in 0..n {
            let mut sum = 0.0f64;
            for p in 0..k {
                sum += at(i, p) as f64 * bt(p, j) as f64;
            }
            let mut value = bias + alpha as f64 * sum;
            if has_beta {
                value += fusion.beta as f64 * c.get(i, j) as f64;
            }
            let value = value as f32;
            c.row_mut(i)[j] = match fusion.activation {
                Activation::Relu => value.max(0.0),
                Activation::None => value,
            };
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_product() {
        let a = [1.0f32, 2.0, 3.0, 4.0];
        let b = [5.0f32, 6.0, 7.0, 8.0];
        let mut c = [0.0f32; 4];
        let a = MatrixView::contiguous(&a, 2, 2).unwrap();
        let b = MatrixView::contiguous(&b, 2, 2).unwrap();
        let mut cv = MatrixViewMut::contiguous(&mut c, 2, 2).unwrap();
        sgemm_reference(&a, false, 1.0, &b, false, &mut cv, &Fusion::default()).unwrap();
        assert_eq!(c, [19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_fusion() {
        let a = [1.0f32, -2.0];
        let b = [3.0f32, 4.0];
        let bias = [1.0f32, 0.5];
        let mut c = [10.0f32, 10.0, 10.0, 10.0];
        // A is 2x1, B is 1x2 (transposed storage as 2x1).
        let a = MatrixView::contiguous(&a, 2, 1).unwrap();
        let b = MatrixView::contiguous(&b, 2, 1).unwrap();
        let mut cv = MatrixViewMut::contiguous(&mut c, 2, 2).unwrap();
        let fusion = Fusion::new().beta(0.5).bias(&bias).relu();
        sgemm_reference(&a, false, 2.0, &b, true, &mut cv, &fusion).unwrap();
        // Row 0: 1 + 5 + 2 * [3, 4]; row 1: 0.5 + 5 - 4 * [3, 4] clamps at 0.
        assert_eq!(c, [12.0, 14.0, 0.0, 0.0]);
    }

    #[test]
    fn test_tiny_beta_ignores_output() {
        let a = [1.0f32];
        let b = [2.0f32];
        let mut c = [f32::NAN];
        let a = MatrixView::contiguous(&a, 1, 1).unwrap();
        let b = MatrixView::contiguous(&b, 1, 1).unwrap();
        let mut cv = MatrixViewMut::contiguous(&mut c, 1, 1).unwrap();
        let fusion = Fusion::new().beta(1e-9);
        sgemm_reference(&a, false, 1.0, &b, false, &mut cv, &fusion).unwrap();
        assert_eq!(c, [2.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let data = [0.0f32; 6];
        let mut out = [0.0f32; 4];
        let a = MatrixView::contiguous(&data, 2, 3).unwrap();
        let b = MatrixView::contiguous(&data, 2, 3).unwrap();
        let mut cv = MatrixViewMut::contiguous(&mut out, 2, 2).unwrap();
        assert!(sgemm_reference(&a, false, 1.0, &b, false, &mut cv, &Fusion::default()).is_err());
    }
}
