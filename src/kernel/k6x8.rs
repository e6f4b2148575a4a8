use super::{load_accumulators, store_accumulators, Epilogue, MicroKernel, TileRows, KBLOCK};
use crate::arch::KernelVariant;
use crate::simd::{prefetch_l1, F32x4};

/// 6x8 tile for 32-bit ARM.
///
/// 12 accumulators. The first four rows broadcast lanes of one A vector; rows
/// 4 and 5 do not fill a vector, so their A values are splatted as scalars.
pub struct Kernel6x8;

type Acc = [[F32x4; 2]; 6];

#[inline(always)]
unsafe fn rank1(acc: &mut Acc, a: *const f32, b: *const f32) -> (*const f32, *const f32) {
    let a0 = F32x4::load(a);
    let a4 = F32x4::splat(*a.add(4));
    let a5 = F32x4::splat(*a.add(5));
    let bv = [F32x4::load(b), F32x4::load(b.add(4))];

    for (c, &bc) in bv.iter().enumerate() {
        acc[0][c] = acc[0][c].fmla_lane::<0>(bc, a0);
        acc[1][c] = acc[1][c].fmla_lane::<1>(bc, a0);
        acc[2][c] = acc[2][c].fmla_lane::<2>(bc, a0);
        acc[3][c] = acc[3][c].fmla_lane::<3>(bc, a0);
        acc[4][c] = acc[4][c].fmla(bc, a4);
        acc[5][c] = acc[5][c].fmla(bc, a5);
    }
    (a.add(6), b.add(8))
}

impl MicroKernel for Kernel6x8 {
    const MR: usize = 6;
    const NR: usize = 8;
    const VARIANT: KernelVariant = KernelVariant::Tile6x8;

    #[inline(always)]
    unsafe fn run(k: usize, a: *const f32, b: *const f32, rows: &TileRows, epilogue: &Epilogue) {
        let mut acc: Acc = load_accumulators::<6, 2>(rows, epilogue);
        let (mut a, mut b) = (a, b);

        for _ in 0..k / KBLOCK {
            prefetch_l1(a.wrapping_add(24));
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
