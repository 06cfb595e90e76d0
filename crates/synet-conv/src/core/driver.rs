//! Spatial tiling driver of the direct NHWC convolution.
//!
//! Loop nest, outermost first:
//!
//! ```text
//! for output-channel block of macro_d:
//!   for input-channel block of macro_c (increasing, term First..Last):
//!     for row band of macro_h:
//!       for micro_d tile:
//!         for row in band: nose | body runs | tail
//! ```
//!
//! The destination is the accumulator across input-channel blocks, so the
//! blocks of one (output block, row band) must run in increasing order and a
//! destination must not be shared between concurrent calls.

use super::epilogue::Epilogue;
use super::kernel::{kernel_table, Tile};
use super::packing::PackedParams;
use super::tiling::{AlgParam, BlockIterator};
use crate::simd::VectorBackend;
use crate::types::{ConvParam, Term};

/// Convolve one NHWC image with weights packed by
/// [`pack_weights`](super::packing::pack_weights).
///
/// # Safety
///
/// The backend's instruction set must be available. Buffer lengths must match
/// `p` and `alg`: `src` holds `p.src_size()` values, `dst` holds
/// `p.dst_size()`, `bias` and per-channel params are padded to `micro_d`.
#[inline(always)]
pub(crate) unsafe fn convolve<B: VectorBackend>(
    p: &ConvParam,
    alg: &AlgParam,
    src: &[f32],
    weight: &[f32],
    bias: &[f32],
    params: &PackedParams,
    dst: &mut [f32],
) {
    debug_assert_eq!(alg.lanes, B::LANES);
    debug_assert_eq!(alg.micro_d, B::LANES * B::REGISTER_GROUPS);
    debug_assert!(src.len() >= p.src_size() && dst.len() >= p.dst_size());

    let kernel_area = p.kernel_y * p.kernel_x;
    let tiles = alg.tiles(p.dst_c);
    let micro_d = alg.micro_d;

    for (dc0, dn) in BlockIterator::new(p.dst_c, alg.macro_d) {
        for (sc, cb) in BlockIterator::new(p.src_c, alg.macro_c) {
            let term = Term::new(sc == 0, sc + cb == p.src_c);
            let block = weight.as_ptr().add(tiles * kernel_area * micro_d * sc);
            for (y0, rows) in BlockIterator::new(p.dst_h, alg.macro_h) {
                for (dc, lanes) in BlockIterator::new(dn, micro_d) {
                    let channel = dc0 + dc;
                    let tile = Tile {
                        p,
                        src: src.as_ptr(),
                        sc,
                        cb,
                        weight: block.add(channel / micro_d * kernel_area * cb * micro_d),
                        dst: dst.as_mut_ptr(),
                        epilogue: Epilogue {
                            term,
                            bias,
                            params,
                            channel,
                            lanes,
                        },
                    };
                    for dy in y0..y0 + rows {
                        row::<B>(&tile, alg, dy);
                    }
                }
            }
        }
    }
}

/// One destination row of one tile: bounds-checked nose, fast body runs with
/// one remainder run, bounds-checked tail.
#[inline(always)]
unsafe fn row<B: VectorBackend>(t: &Tile<'_>, alg: &AlgParam, dy: usize) {
    let (nose, body, width) = (alg.nose_w, alg.body_w, t.p.dst_w);
    for dx in 0..nose {
        kernel_table::<B, true>(1, t, dy, dx);
    }

    let run = alg.kernel_run;
    let full = nose + (body - nose) / run * run;
    let mut dx = nose;
    while dx < full {
        kernel_table::<B, false>(run, t, dy, dx);
        dx += run;
    }
    if dx < body {
        kernel_table::<B, false>(body - dx, t, dy, dx);
    }

    for dx in body..width {
        kernel_table::<B, true>(1, t, dy, dx);
    }
}
