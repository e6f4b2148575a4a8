mod common;

use common::{context, random_matrix};
use ndarray::{s, Array2};
use packed_sgemm::{
    packed_a_len, prepack_a_ndarray, prepack_a_raw, sgemm_ndarray, sgemm_prepack_raw,
    sgemm_reference, Fusion, KernelVariant, MatrixView, MatrixViewMut,
};
use rand::prelude::*;

fn random_array(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f32> {
    Array2::from_shape_vec((rows, cols), random_matrix(rows * cols, rng)).unwrap()
}

fn assert_close(actual: &Array2<f32>, expected: &Array2<f32>, k: usize) {
    let tol = 1e-5 * (k as f32 * 1e4 + 100.0);
    for ((idx, &x), &y) in actual.indexed_iter().zip(expected.iter()) {
        assert!((x - y).abs() <= tol, "{idx:?}: {x} vs {y}");
    }
}

#[test]
fn test_ndarray_matches_dot() {
    let mut rng = StdRng::seed_from_u64(10);
    for variant in KernelVariant::ALL {
        let mut ctx = context(variant, 2);
        let (m, n, k) = (23, 31, 17);
        let a = random_array(m, k, &mut rng);
        let b = random_array(k, n, &mut rng);
        let packed = prepack_a_ndarray(&ctx, a.view(), 1.0, false).unwrap();

        let mut c = Array2::<f32>::zeros((m, n));
        sgemm_ndarray(&mut ctx, false, &packed, b.view(), &mut c.view_mut(), &Fusion::default()).unwrap();
        assert_close(&c, &a.dot(&b), k);
    }
}

#[test]
fn test_ndarray_non_standard_layouts() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut ctx = context(KernelVariant::Tile8x12, 2);
    let (m, n, k) = (10, 14, 9);

    // A given as the transpose of a K x M array.
    let a_t = random_array(k, m, &mut rng);
    let packed = prepack_a_ndarray(&ctx, a_t.t(), 2.0, false).unwrap();

    // B given as a column-major view.
    let b_t = random_array(n, k, &mut rng);
    let b = b_t.t();

    // C is a column slice of a wider array, so its rows are strided.
    let mut wide = Array2::<f32>::from_elem((m, n + 4), 1.0);
    let bias: Vec<f32> = (0..m).map(|i| i as f32).collect();
    let fusion = Fusion::new().beta(1.0).bias(&bias);
    {
        let mut c = wide.slice_mut(s![.., 2..n + 2]);
        sgemm_ndarray(&mut ctx, false, &packed, b, &mut c, &fusion).unwrap();
    }

    let product = a_t.t().dot(&b) * 2.0;
    let mut expected = Array2::<f32>::from_elem((m, n), 1.0) + &product;
    for (i, mut row) in expected.rows_mut().into_iter().enumerate() {
        row += bias[i];
    }
    assert_close(&wide.slice(s![.., 2..n + 2]).to_owned(), &expected, k);
    assert!(wide.slice(s![.., ..2]).iter().all(|&x| x == 1.0));
    assert!(wide.slice(s![.., n + 2..]).iter().all(|&x| x == 1.0));
}

#[test]
fn test_ndarray_transposed_b() {
    let mut rng = StdRng::seed_from_u64(12);
    let mut ctx = context(KernelVariant::Tile4x8, 1);
    let (m, n, k) = (6, 11, 13);
    let a = random_array(m, k, &mut rng);
    let b_nk = random_array(n, k, &mut rng);
    let packed = prepack_a_ndarray(&ctx, a.view(), 1.0, false).unwrap();
    let mut c = Array2::<f32>::zeros((m, n));
    sgemm_ndarray(&mut ctx, true, &packed, b_nk.view(), &mut c.view_mut(), &Fusion::default()).unwrap();
    assert_close(&c, &a.dot(&b_nk.t()), k);
}

#[test]
fn test_raw_entry_points_with_strides() {
    let mut rng = StdRng::seed_from_u64(13);
    for variant in KernelVariant::ALL {
        for trans_b in [false, true] {
            let mut ctx = context(variant, 2);
            let (m, n, k) = (13, 19, 10);
            let (lda, ldb, ldc) = (k + 3, if trans_b { k + 2 } else { n + 2 }, n + 5);
            let b_rows = if trans_b { n } else { k };

            let a = random_matrix(m * lda, &mut rng);
            let b = random_matrix(b_rows * ldb, &mut rng);
            let bias = random_matrix(m, &mut rng);
            let initial = random_matrix(m * ldc, &mut rng);

            let mut packed = vec![0.0f32; packed_a_len(variant, m, k)];
            let mut c = initial.clone();
            unsafe {
                prepack_a_raw(packed.as_mut_ptr(), a.as_ptr(), 1.0, lda, 0, m, 0, k, false, &ctx);
                sgemm_prepack_raw(
                    trans_b,
                    m,
                    n,
                    k,
                    packed.as_ptr(),
                    b.as_ptr(),
                    ldb,
                    0.5,
                    c.as_mut_ptr(),
                    ldc,
                    bias.as_ptr(),
                    true,
                    true,
                    &mut ctx,
                )
                .unwrap();
            }

            let av = MatrixView::new(&a, m, k, lda).unwrap();
            let (br, bc) = if trans_b { (n, k) } else { (k, n) };
            let bv = MatrixView::new(&b, br, bc, ldb).unwrap();
            let mut expected = initial.clone();
            let mut e = MatrixViewMut::new(&mut expected, m, n, ldc).unwrap();
            let fusion = Fusion::new().beta(0.5).bias(&bias).relu();
            sgemm_reference(&av, false, 1.0, &bv, trans_b, &mut e, &fusion).unwrap();

            let tol = 1e-5 * (k as f32 * 1e4 + 200.0);
            for i in 0..m {
                for j in 0..ldc {
                    let (x, y) = (c[i * ldc + j], expected[i * ldc + j]);
                    if j < n {
                        assert!((x - y).abs() <= tol, "{variant} trans_b {trans_b} ({i}, {j})");
                    } else {
                        assert_eq!(x.to_bits(), initial[i * ldc + j].to_bits());
                    }
                }
            }
        }
    }
}
