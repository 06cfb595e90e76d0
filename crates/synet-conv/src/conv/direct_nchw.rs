//! Direct NCHW convolution: each output plane accumulates one scaled,
//! shifted source plane per (input channel, tap).

use std::ops::Range;

use crate::core::{apply_bias_activation, pack_bias, PackedParams};
use crate::error::Result;
use crate::types::ConvParam;

/// Output coordinates whose tap at `offset = k * dilation` lands inside a
/// source axis of length `src`.
fn valid_range(src: usize, pad: usize, offset: usize, stride: usize, dst: usize) -> Range<usize> {
    let begin = pad.saturating_sub(offset).div_ceil(stride);
    let end = match (src + pad).checked_sub(offset + 1) {
        Some(last) => (last / stride + 1).min(dst),
        None => 0,
    };
    begin.min(end)..end
}

pub(crate) struct DirectNchw {
    p: ConvParam,
    weight: Vec<f32>,
    bias: Vec<f32>,
    params: PackedParams,
}

impl DirectNchw {
    pub fn new(p: &ConvParam) -> Self {
        Self {
            p: *p,
            weight: Vec::new(),
            bias: Vec::new(),
            params: PackedParams::default(),
        }
    }

    pub fn set_weights(&mut self, weight: &[f32], bias: Option<&[f32]>, params: &[f32]) -> Result<()> {
        self.params = PackedParams::pack(self.p.activation, params, self.p.dst_c, 1)?;
        self.weight = weight.to_vec();
        self.bias = pack_bias(bias, self.p.dst_c, 1);
        Ok(())
    }

    pub fn forward(&self, src: &[f32], dst: &mut [f32]) {
        let p = &self.p;
        let src_cg = p.src_c / p.group;
        let dst_cg = p.dst_c / p.group;
        let (src_area, dst_area) = (p.src_h * p.src_w, p.dst_h * p.dst_w);

        let rows: Vec<Range<usize>> = (0..p.kernel_y)
            .map(|ky| valid_range(p.src_h, p.pad_y, ky * p.dilation_y, p.stride_y, p.dst_h))
            .collect();
        let cols: Vec<Range<usize>> = (0..p.kernel_x)
            .map(|kx| valid_range(p.src_w, p.pad_x, kx * p.dilation_x, p.stride_x, p.dst_w))
            .collect();

        for oc in 0..p.dst_c {
            let g = oc / dst_cg;
            let plane = &mut dst[oc * dst_area..(oc + 1) * dst_area];
            plane.fill(0.0);
            for icg in 0..src_cg {
                let ic = g * src_cg + icg;
                let src_plane = &src[ic * src_area..(ic + 1) * src_area];
                for ky in 0..p.kernel_y {
                    for kx in 0..p.kernel_x {
                        let w = self.weight[p.weight_index(oc, icg, ky, kx)];
                        let sx0 = kx * p.dilation_x;
                        for dy in rows[ky].clone() {
                            let sy = dy * p.stride_y + ky * p.dilation_y - p.pad_y;
                            let src_row = &src_plane[sy * p.src_w..(sy + 1) * p.src_w];
                            let dst_row = &mut plane[dy * p.dst_w..(dy + 1) * p.dst_w];
                            for dx in cols[kx].clone() {
                                dst_row[dx] += w * src_row[dx * p.stride_x + sx0 - p.pad_x];
                            }
                        }
                    }
                }
            }
        }
        apply_bias_activation(p, &self.bias, &self.params, dst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::tests::{assert_close, Fixture};
    use crate::conv::Strategy;
    use crate::types::{ActivationKind, Layout};

    #[test]
    fn test_valid_range() {
        // src 5, pad 1, k 3: tap 0 skips column 0, tap 2 skips column 4.
        assert_eq!(valid_range(5, 1, 0, 1, 5), 1..5);
        assert_eq!(valid_range(5, 1, 1, 1, 5), 0..5);
        assert_eq!(valid_range(5, 1, 2, 1, 5), 0..4);
        // Stride 2.
        assert_eq!(valid_range(6, 2, 0, 2, 4), 1..4);
        // Tap beyond the source.
        assert_eq!(valid_range(1, 2, 4, 1, 1), 0..0);
    }

    #[test]
    fn test_matches_reference() {
        let cases = [
            ConvParam::new(3, 10, 11, 4, 3).with_pad(1, 1, 1, 1),
            ConvParam::new(2, 9, 9, 5, 3).with_stride(2, 2).with_activation(ActivationKind::Relu),
            ConvParam::new(4, 8, 8, 6, 2).with_group(2).with_stride(3, 3),
            ConvParam::new(2, 9, 10, 3, 3).with_dilation(2, 2).with_pad(0, 2, 3, 1),
        ];
        for (i, p) in cases.into_iter().enumerate() {
            let p = p.with_layout(Layout::Nchw);
            let fixture = Fixture::new(p, 30 + i as u64);
            assert_close(&fixture.run(Strategy::DirectNchw), &fixture.expected(), 1e-4);
        }
    }
}
