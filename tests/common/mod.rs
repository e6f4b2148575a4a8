#![allow(dead_code)]

use packed_sgemm::{
    prepack_a, sgemm, sgemm_reference, Context, Fusion, KernelVariant, MatrixView, MatrixViewMut,
};
use rand::prelude::*;

pub const GUARD: f32 = -7777.0;

pub fn context(variant: KernelVariant, threads: usize) -> Context {
    Context::builder()
        .threads(threads)
        .variant(variant)
        .build()
        .expect("context")
}

pub fn random_matrix(len: usize, rng: &mut StdRng) -> Vec<f32> {
    (0..len).map(|_| rng.random_range(-100.0..100.0)).collect()
}

/// One GEMM problem; A and B are generated in their stored orientation.
#[derive(Debug, Clone, Copy)]
pub struct Case {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub trans_a: bool,
    pub trans_b: bool,
    pub alpha: f32,
    pub beta: f32,
    pub bias: bool,
    pub relu: bool,
    /// Extra columns between rows of C.
    pub ldc_pad: usize,
}

impl Case {
    pub fn new(m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            trans_a: false,
            trans_b: false,
            alpha: 1.0,
            beta: 0.0,
            bias: false,
            relu: false,
            ldc_pad: 0,
        }
    }
}

pub struct Outcome {
    pub packed: Vec<f32>,
    pub reference: Vec<f32>,
    /// Sum of absolute terms per element, used to scale the tolerance.
    pub scale: Vec<f32>,
    pub initial: Vec<f32>,
    pub ldc: usize,
}

fn abs(values: &[f32]) -> Vec<f32> {
    values.iter().map(|x| x.abs()).collect()
}

pub fn run_case(ctx: &mut Context, case: &Case, seed: u64) -> Outcome {
    let Case { m, n, k, .. } = *case;
    let mut rng = StdRng::seed_from_u64(seed);
    let a = random_matrix(m * k, &mut rng);
    let b = random_matrix(k * n, &mut rng);
    let ldc = n + case.ldc_pad;
    let initial = random_matrix(m * ldc, &mut rng);
    let bias = random_matrix(m, &mut rng);

    let (a_rows, a_cols) = if case.trans_a { (k, m) } else { (m, k) };
    let (b_rows, b_cols) = if case.trans_b { (n, k) } else { (k, n) };
    let av = MatrixView::contiguous(&a, a_rows, a_cols).unwrap();
    let bv = MatrixView::contiguous(&b, b_rows, b_cols).unwrap();

    let mut fusion = Fusion::new().beta(case.beta);
    if case.bias {
        fusion = fusion.bias(&bias);
    }
    if case.relu {
        fusion = fusion.relu();
    }

    let packed_a = prepack_a(ctx, &av, case.alpha, case.trans_a).unwrap();
    let mut packed = initial.clone();
    let mut cv = MatrixViewMut::new(&mut packed, m, n, ldc).unwrap();
    sgemm(ctx, case.trans_b, &packed_a, &bv, &mut cv, &fusion).unwrap();

    let mut reference = initial.clone();
    let mut cv = MatrixViewMut::new(&mut reference, m, n, ldc).unwrap();
    sgemm_reference(&av, case.trans_a, case.alpha, &bv, case.trans_b, &mut cv, &fusion).unwrap();

    let (a_abs, b_abs, bias_abs) = (abs(&a), abs(&b), abs(&bias));
    let mut scale = abs(&initial);
    let mut scale_fusion = Fusion::new().beta(case.beta.abs());
    if case.bias {
        scale_fusion = scale_fusion.bias(&bias_abs);
    }
    let a_abs_view = MatrixView::contiguous(&a_abs, a_rows, a_cols).unwrap();
    let b_abs_view = MatrixView::contiguous(&b_abs, b_rows, b_cols).unwrap();
    let mut sv = MatrixViewMut::new(&mut scale, m, n, ldc).unwrap();
    sgemm_reference(
        &a_abs_view,
        case.trans_a,
        case.alpha.abs(),
        &b_abs_view,
        case.trans_b,
        &mut sv,
        &scale_fusion,
    )
    .unwrap();

    Outcome {
        packed,
        reference,
        scale,
        initial,
        ldc,
    }
}

/// Checks the valid region against the reference and that row padding
/// past `n` was left alone.
pub fn assert_matches(outcome: &Outcome, case: &Case, what: &str) {
    for i in 0..case.m {
        for j in 0..outcome.ldc {
            let at = i * outcome.ldc + j;
            let actual = outcome.packed[at];
            if j >= case.n {
                assert_eq!(
                    actual.to_bits(),
                    outcome.initial[at].to_bits(),
                    "{what}: padding ({i}, {j}) was overwritten"
                );
                continue;
            }
            let expected = outcome.reference[at];
            let tol = 1e-5 * outcome.scale[at].max(1.0);
            assert!(
                (actual - expected).abs() <= tol,
                "{what}: ({i}, {j}) = {actual}, expected {expected} (tol {tol})"
            );
        }
    }
}
