use super::{load_accumulators, store_accumulators, Epilogue, MicroKernel, TileRows, KBLOCK};
use crate::arch::KernelVariant;
use crate::simd::{prefetch_l1, F32x4};

/// 4x8 tile for 32-bit ARM cores with a narrow issue width (Cortex-A73).
pub struct Kernel4x8;

type Acc = [[F32x4; 2]; 4];

#[inline(always)]
unsafe fn rank1(acc: &mut Acc, a: *const f32, b: *const f32) -> (*const f32, *const f32) {
    let a0 = F32x4::load(a);
    let b0 = F32x4::load(b);
    let b1 = F32x4::load(b.add(4));

    acc[0][0] = acc[0][0].fmla_lane::<0>(b0, a0);
    acc[0][1] = acc[0][1].fmla_lane::<0>(b1, a0);
    acc[1][0] = acc[1][0].fmla_lane::<1>(b0, a0);
    acc[1][1] = acc[1][1].fmla_lane::<1>(b1, a0);
    acc[2][0] = acc[2][0].fmla_lane::<2>(b0, a0);
    acc[2][1] = acc[2][1].fmla_lane::<2>(b1, a0);
    acc[3][0] = acc[3][0].fmla_lane::<3>(b0, a0);
    acc[3][1] = acc[3][1].fmla_lane::<3>(b1, a0);
    (a.add(4), b.add(8))
}

impl MicroKernel for Kernel4x8 {
    const MR: usize = 4;
    const NR: usize = 8;
    const VARIANT: KernelVariant = KernelVariant::Tile4x8;

    #[inline(always)]
    unsafe fn run(k: usize, a: *const f32, b: *const f32, rows: &TileRows, epilogue: &Epilogue) {
        let mut acc: Acc = load_accumulators::<4, 2>(rows, epilogue);
        let (mut a, mut b) = (a, b);

        for _ in 0..k / KBLOCK {
            prefetch_l1(a.wrapping_add(16));
            prefetch_l1(b.wrapping_add(32));
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
