//! Register-blocked micro-kernel of the direct NHWC convolution.
//!
//! One call produces `M` consecutive destination positions of one row for one
//! output tile of up to `MAX_REGISTER_GROUPS × F` channels:
//!
//! ```text
//! for (ky, kx, ic) in taps × block channels:
//!     w[g] = load(weights + g*F)              // once per tap
//!     for m in 0..M:
//!         s = splat(src[y, x_m, sc + ic])
//!         acc[m][g] = fmadd(s, w[g], acc[m][g])
//! ```

use super::epilogue::{store, Epilogue};
use super::tiling::MAX_REGISTER_GROUPS;
use crate::simd::VectorBackend;
use crate::types::ConvParam;

/// Everything one micro-tile invocation reads and writes.
#[derive(Clone, Copy)]
pub(crate) struct Tile<'a> {
    pub p: &'a ConvParam,
    /// Source image, NHWC.
    pub src: *const f32,
    /// First input channel of the current block.
    pub sc: usize,
    /// Channels in the current block.
    pub cb: usize,
    /// Packed weights of this tile within the current block.
    pub weight: *const f32,
    /// Destination image, NHWC.
    pub dst: *mut f32,
    pub epilogue: Epilogue<'a>,
}

/// Compute `M` positions starting at `(dy, dx)`.
///
/// With `BORDER` every source column is checked against the padding;
/// without it the caller guarantees all columns are inside the source.
/// Rows outside the source are always skipped.
///
/// # Safety
///
/// `t` must describe buffers valid for the whole convolution and the
/// backend's instruction set must be available.
#[inline(always)]
pub(crate) unsafe fn kernel<B: VectorBackend, const M: usize, const BORDER: bool>(
    t: &Tile<'_>,
    dy: usize,
    dx: usize,
) {
    let p = t.p;
    let f = B::LANES;
    let micro_d = f * B::REGISTER_GROUPS;
    let ep = &t.epilogue;
    let groups = ep.lanes.div_ceil(f);

    let mut acc = [[B::zero(); MAX_REGISTER_GROUPS]; M];
    if !ep.term.is_first() {
        for (m, row) in acc.iter_mut().enumerate() {
            let d = t.dst.add(p.dst_index(ep.channel, dy, dx + m));
            for (g, v) in row.iter_mut().enumerate().take(groups) {
                let live = ep.lanes - g * f;
                *v = if live >= f {
                    B::load(d.add(g * f))
                } else {
                    B::load_partial(d.add(g * f), live)
                };
            }
        }
    }

    for ky in 0..p.kernel_y {
        let Some(sy) = p.src_y(dy, ky) else { continue };
        for kx in 0..p.kernel_x {
            let mut src = [std::ptr::null::<f32>(); M];
            for (m, s) in src.iter_mut().enumerate() {
                let sx = if BORDER {
                    match p.src_x(dx + m, kx) {
                        Some(sx) => sx,
                        None => continue,
                    }
                } else {
                    (dx + m) * p.stride_x + kx * p.dilation_x - p.pad_x
                };
                *s = t.src.add(p.src_index(t.sc, sy, sx));
            }
            let tap = t.weight.add((ky * p.kernel_x + kx) * t.cb * micro_d);
            for ic in 0..t.cb {
                let w_ptr = tap.add(ic * micro_d);
                let mut w = [B::zero(); MAX_REGISTER_GROUPS];
                for (g, v) in w.iter_mut().enumerate().take(groups) {
                    *v = B::load(w_ptr.add(g * f));
                }
                for m in 0..M {
                    if BORDER && src[m].is_null() {
                        continue;
                    }
                    let s = B::splat(*src[m].add(ic));
                    for g in 0..groups {
                        acc[m][g] = B::fmadd(s, w[g], acc[m][g]);
                    }
                }
            }
        }
    }

    for (m, row) in acc.iter().enumerate() {
        store::<B>(t.dst.add(p.dst_index(ep.channel, dy, dx + m)), row, ep);
    }
}

/// Run the `m`-position specialisation, `m` in `1..=14`.
///
/// # Safety
///
/// As for [`kernel`].
#[inline(always)]
pub(crate) unsafe fn kernel_table<B: VectorBackend, const BORDER: bool>(
    m: usize,
    t: &Tile<'_>,
    dy: usize,
    dx: usize,
) {
    match m {
        1 => kernel::<B, 1, BORDER>(t, dy, dx),
        2 => kernel::<B, 2, BORDER>(t, dy, dx),
        3 => kernel::<B, 3, BORDER>(t, dy, dx),
        4 => kernel::<B, 4, BORDER>(t, dy, dx),
        5 => kernel::<B, 5, BORDER>(t, dy, dx),
        6 => kernel::<B, 6, BORDER>(t, dy, dx),
        7 => kernel::<B, 7, BORDER>(t, dy, dx),
        8 => kernel::<B, 8, BORDER>(t, dy, dx),
        9 => kernel::<B, 9, BORDER>(t, dy, dx),
        10 => kernel::<B, 10, BORDER>(t, dy, dx),
        11 => kernel::<B, 11, BORDER>(t, dy, dx),
        12 => kernel::<B, 12, BORDER>(t, dy, dx),
        13 => kernel::<B, 13, BORDER>(t, dy, dx),
        14 => kernel::<B, 14, BORDER>(t, dy, dx),
        _ => unreachable!("no micro-kernel for run length {}", m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSizes;
    use crate::core::packing::{pack_bias, pack_weights, PackedParams};
    use crate::core::tiling::plan_blocks;
    use crate::reference;
    use crate::simd::Portable;
    use crate::types::{ActivationKind, Term};

    #[test]
    fn test_border_and_fast_kernels_agree() {
        let p = ConvParam::new(3, 4, 9, 6, 3).with_pad(1, 1, 1, 1);
        let alg = plan_blocks(&p, 4, 2, 4, &CacheSizes::default());
        let src: Vec<f32> = (0..p.src_size()).map(|i| (i % 7) as f32 - 3.0).collect();
        let weight: Vec<f32> = (0..p.weight_size()).map(|i| (i % 5) as f32 * 0.5 - 1.0).collect();
        let packed = pack_weights(&p, &alg, &weight);
        let bias = pack_bias(None, p.dst_c, alg.micro_d);
        let params = PackedParams::identity(ActivationKind::Identity);

        let mut expected = vec![0.0; p.dst_size()];
        reference::convolve(&p, &src, &weight, None, &[], &mut expected).unwrap();

        // Interior columns 1..8 of row 2 through both kernels.
        for border in [false, true] {
            let mut dst = vec![0.0f32; p.dst_size()];
            let t = Tile {
                p: &p,
                src: src.as_ptr(),
                sc: 0,
                cb: p.src_c,
                weight: packed.as_ptr(),
                dst: dst.as_mut_ptr(),
                epilogue: Epilogue {
                    term: Term::Single,
                    bias: &bias,
                    params: &params,
                    channel: 0,
                    lanes: p.dst_c,
                },
            };
            unsafe {
                if border {
                    kernel_table::<Portable, true>(7, &t, 2, 1);
                } else {
                    kernel_table::<Portable, false>(7, &t, 2, 1);
                }
            }
            for x in 1..8 {
                for c in 0..p.dst_c {
                    let i = p.dst_index(c, 2, x);
                    assert!((dst[i] - expected[i]).abs() < 1e-5, "x={} c={}", x, c);
                }
            }
        }
    }
}
