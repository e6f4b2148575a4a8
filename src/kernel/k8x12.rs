use super::{load_accumulators, store_accumulators, Epilogue, MicroKernel, TileRows, KBLOCK};
use crate::arch::KernelVariant;
use crate::simd::{prefetch_l1, F32x4};

/// 8x12 tile for 64-bit ARM.
///
/// 24 accumulators (8 rows x 3 vectors), two A vectors and three B vectors
/// per step: 29 of the 32 NEON registers. Every FMA broadcasts one A lane
/// straight from the register, so A is never splatted through memory.
pub struct Kernel8x12;

type Acc = [[F32x4; 3]; 8];

#[inline(always)]
unsafe fn rank1(acc: &mut Acc, a: *const f32, b: *const f32) -> (*const f32, *const f32) {
    let a0 = F32x4::load(a);
    let a1 = F32x4::load(a.add(4));
    let bv = [F32x4::load(b), F32x4::load(b.add(4)), F32x4::load(b.add(8))];

    for (c, &bc) in bv.iter().enumerate() {
        acc[0][c] = acc[0][c].fmla_lane::<0>(bc, a0);
        acc[1][c] = acc[1][c].fmla_lane::<1>(bc, a0);
        acc[2][c] = acc[2][c].fmla_lane::<2>(bc, a0);
        acc[3][c] = acc[3][c].fmla_lane::<3>(bc, a0);
        acc[4][c] = acc[4][c].fmla_lane::<0>(bc, a1);
        acc[5][c] = acc[5][c].fmla_lane::<1>(bc, a1);
        acc[6][c] = acc[6][c].fmla_lane::<2>(bc, a1);
        acc[7][c] = acc[7][c].fmla_lane::<3>(bc, a1);
    }
    (a.add(8), b.add(12))
}

impl MicroKernel for Kernel8x12 {
    const MR: usize = 8;
    const NR: usize = 12;
    const VARIANT: KernelVariant = KernelVariant::Tile8x12;

    #[inline(always)]
    unsafe fn run(k: usize, a: *const f32, b: *const f32, rows: &TileRows, epilogue: &Epilogue) {
        let mut acc: Acc = load_accumulators::<8, 3>(rows, epilogue);
        let (mut a, mut b) = (a, b);

        for _ in 0..k / KBLOCK {
            prefetch_l1(a.wrapping_add(32));
            prefetch_l1(b.wrapping_add(48));
            (a, b) = rank1(&mut acc, a, b);
            (a, b) = rank1(&mut acc, a, b);
            (a, b) = rank1(&mut acc, a, b);
            (a, b) = rank1(&mut acc, a, b);
        }

        match k % KBLOCK {
            3 => {
                (a, b) = rank1(&mut acc, a, b);
                (a, b) = rank1(&mut acc, a, b);
                rank1(&mut acc, a, b);
            }
            2 => {
                (a, b) = rank1(&mut acc, a, b);
                rank1(&mut acc, a, b);
            }
            1 => {
                rank1(&mut acc, a, b);
            }
            _ => {}
        }

        store_accumulators(&acc, rows, epilogue.relu);
    }
}
