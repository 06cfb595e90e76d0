//! GEMM against the transposed row matrix, for tiny images and for NHWC
//! reductions to a single channel.

use crate::core::{apply_bias_activation, pack_bias, sgemm, PackedParams, Transpose};
use crate::error::Result;
use crate::types::{ConvParam, Layout};

/// Unfold an NCHW image into `N × K` rows, K ordered `[ic][ky][kx]` like the
/// NCHW weights.
fn unfold_rows(p: &ConvParam, src: &[f32], buf: &mut [f32]) {
    let k = p.src_c * p.kernel_y * p.kernel_x;
    for dy in 0..p.dst_h {
        for dx in 0..p.dst_w {
            let row = &mut buf[(dy * p.dst_w + dx) * k..(dy * p.dst_w + dx + 1) * k];
            let mut i = 0;
            for ic in 0..p.src_c {
                for ky in 0..p.kernel_y {
                    let sy = p.src_y(dy, ky);
                    for kx in 0..p.kernel_x {
                        row[i] = match (sy, p.src_x(dx, kx)) {
                            (Some(sy), Some(sx)) => src[p.src_index(ic, sy, sx)],
                            _ => 0.0,
                        };
                        i += 1;
                    }
                }
            }
        }
    }
}

pub(crate) struct GemmNT {
    p: ConvParam,
    weight: Vec<f32>,
    bias: Vec<f32>,
    params: PackedParams,
}

impl GemmNT {
    pub fn new(p: &ConvParam) -> Self {
        debug_assert_eq!(p.group, 1);
        Self {
            p: *p,
            weight: Vec::new(),
            bias: Vec::new(),
            params: PackedParams::default(),
        }
    }

    pub fn buffer_len(&self) -> usize {
        let p = &self.p;
        match p.layout {
            Layout::Nchw => p.dst_h * p.dst_w * p.src_c * p.kernel_y * p.kernel_x,
            Layout::Nhwc => 0,
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
        let n = p.dst_h * p.dst_w;
        match p.layout {
            Layout::Nchw => {
                let k = p.src_c * p.kernel_y * p.kernel_x;
                unfold_rows(p, src, buf);
                sgemm(p.dst_c, n, k, &self.weight, k, Transpose::NoTrans, buf, k, Transpose::Trans, dst, n);
            }
            Layout::Nhwc => {
                sgemm(
                    1,
                    n,
                    p.src_c,
                    &self.weight,
                    p.src_c,
                    Transpose::NoTrans,
                    src,
                    p.src_c,
                    Transpose::Trans,
                    dst,
                    n,
                );
            }
        }
        apply_bias_activation(p, &self.bias, &self.params, dst);
    }
}
