//! im2col / im2row followed by GEMM, per group.

use crate::core::{apply_bias_activation, pack_bias, sgemm, PackedParams, Transpose};
use crate::error::Result;
use crate::types::{ConvParam, Layout};

/// Unfold one group of an NCHW image: row `(ic * ky + y) * kx + x` of the
/// `K × N` result holds the tap `(y, x)` of channel `ic` for every output pixel.
pub(crate) fn im2col(p: &ConvParam, src: &[f32], group: usize, buf: &mut [f32]) {
    let src_cg = p.src_c / p.group;
    let n = p.dst_h * p.dst_w;
    let mut row = 0;
    for ic in group * src_cg..(group + 1) * src_cg {
        for ky in 0..p.kernel_y {
            for kx in 0..p.kernel_x {
                let out = &mut buf[row * n..(row + 1) * n];
                for dy in 0..p.dst_h {
                    let sy = p.src_y(dy, ky);
                    for dx in 0..p.dst_w {
                        out[dy * p.dst_w + dx] = match (sy, p.src_x(dx, kx)) {
                            (Some(sy), Some(sx)) => src[p.src_index(ic, sy, sx)],
                            _ => 0.0,
                        };
                    }
                }
                row += 1;
            }
        }
    }
}

/// Unfold one group of an NHWC image: row `dy * dst_w + dx` of the `N × K`
/// result holds the window of that output pixel in `[ky][kx][ic]` order.
pub(crate) fn im2row(p: &ConvParam, src: &[f32], group: usize, buf: &mut [f32]) {
    let src_cg = p.src_c / p.group;
    let k = p.kernel_y * p.kernel_x * src_cg;
    for dy in 0..p.dst_h {
        for dx in 0..p.dst_w {
            let out = &mut buf[(dy * p.dst_w + dx) * k..(dy * p.dst_w + dx + 1) * k];
            let mut i = 0;
            for ky in 0..p.kernel_y {
                let sy = p.src_y(dy, ky);
                for kx in 0..p.kernel_x {
                    match (sy, p.src_x(dx, kx)) {
                        (Some(sy), Some(sx)) => {
                            let at = p.src_index(group * src_cg, sy, sx);
                            out[i..i + src_cg].copy_from_slice(&src[at..at + src_cg]);
                        }
                        _ => out[i..i + src_cg].fill(0.0),
                    }
                    i += src_cg;
                }
            }
        }
    }
}

pub(crate) struct GemmNN {
    p: ConvParam,
    weight: Vec<f32>,
    bias: Vec<f32>,
    params: PackedParams,
}

impl GemmNN {
    pub fn new(p: &ConvParam) -> Self {
        Self {
            p: *p,
            weight: Vec::new(),
            bias: Vec::new(),
            params: PackedParams::default(),
        }
    }

    pub fn buffer_len(&self) -> usize {
        let p = &self.p;
        if p.is_1x1() {
            0
        } else {
            p.kernel_y * p.kernel_x * p.src_c / p.group * p.dst_h * p.dst_w
        }
    }

    pub fn set_weights(&mut self, weight: &[f32], bias: Option<&[f32]>, params: &[f32]) -> Result<()> {
        self.params = PackedParams::pack(self.p.activation, params, self.p.dst_c, 1)?;
        self.weight = weight.to_vec();
        self.bias = pack_bias(bias, self.p.dst_c, 1);
        Ok(())
    }

    pub fn forward(&self, src: &[f32], buf: &mut [f32], dst: &mut [f32]) {
        let p = &self.p;
        let src_cg = p.src_c / p.group;
        let dst_cg = p.dst_c / p.group;
        let k = p.kernel_y * p.kernel_x * src_cg;
        let n = p.dst_h * p.dst_w;
        for g in 0..p.group {
            match p.layout {
                Layout::Nchw => {
                    let b: &[f32] = if p.is_1x1() {
                        &src[g * src_cg * n..]
                    } else {
                        im2col(p, src, g, buf);
                        &*buf
                    };
                    sgemm(
                        dst_cg,
                        n,
                        k,
                        &self.weight[g * dst_cg * k..],
                        k,
                        Transpose::NoTrans,
                        b,
                        n,
                        Transpose::NoTrans,
                        &mut dst[g * dst_cg * n..],
                        n,
                    );
                }
                Layout::Nhwc => {
                    let (a, lda): (&[f32], usize) = if p.is_1x1() {
                        (&src[g * src_cg..], p.src_c)
                    } else {
                        im2row(p, src, g, buf);
                        (&*buf, k)
                    };
                    sgemm(
                        n,
                        dst_cg,
                        k,
                        a,
                        lda,
                        Transpose::NoTrans,
                        &self.weight[g * dst_cg..],
                        p.dst_c,
                        Transpose::NoTrans,
                        &mut dst[g * dst_cg..],
                        p.dst_c,
                    );
                }
            }
        }
        apply_bias_activation(p, &self.bias, &self.params, dst);
    }
}
