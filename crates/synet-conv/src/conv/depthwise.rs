//! Depthwise convolution whose kernel covers the whole source: every output
//! channel is one dot product.

use crate::core::{activate, pack_bias, PackedParams};
use crate::error::Result;
use crate::types::{ConvParam, Layout};

pub(crate) struct DepthwiseDotProduct {
    p: ConvParam,
    weight: Vec<f32>,
    bias: Vec<f32>,
    params: PackedParams,
}

impl DepthwiseDotProduct {
    pub fn new(p: &ConvParam) -> Self {
        debug_assert!(p.is_depthwise() && p.dst_h == 1 && p.dst_w == 1);
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

    /// Source and weights share one layout per memory order: `[c][h][w]` for
    /// NCHW and `[h][w][c]` for NHWC.
    pub fn forward(&self, src: &[f32], dst: &mut [f32]) {
        let channels = self.p.src_c;
        let area = self.p.src_h * self.p.src_w;
        match self.p.layout {
            Layout::Nchw => {
                for (c, out) in dst.iter_mut().enumerate().take(channels) {
                    let s = &src[c * area..(c + 1) * area];
                    let w = &self.weight[c * area..(c + 1) * area];
                    let sum: f32 = s.iter().zip(w).map(|(a, b)| a * b).sum();
                    *out = activate(sum + self.bias[c], &self.params, c);
                }
            }
            Layout::Nhwc => {
                let out = &mut dst[..channels];
                out.fill(0.0);
                for (s, w) in src.chunks_exact(channels).zip(self.weight.chunks_exact(channels)) {
                    for ((o, a), b) in out.iter_mut().zip(s).zip(w) {
                        *o += a * b;
                    }
                }
                for (c, o) in out.iter_mut().enumerate() {
                    *o = activate(*o + self.bias[c], &self.params, c);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::tests::{assert_close, Fixture};
    use crate::conv::Strategy;
    use crate::types::ActivationKind;

    #[test]
    fn test_unit_weights_sum_each_channel() {
        for layout in [Layout::Nchw, Layout::Nhwc] {
            let p = ConvParam::new(3, 2, 2, 3, 2).with_group(3).with_layout(layout);
            let mut engine = DepthwiseDotProduct::new(&p);
            engine.set_weights(&vec![1.0; p.weight_size()], None, &[]).unwrap();
            // Channel c holds the values c*10 + 1..=4.
            let mut src = vec![0.0; p.src_size()];
            for c in 0..3 {
                for (i, (y, x)) in [(0, 0), (0, 1), (1, 0), (1, 1)].into_iter().enumerate() {
                    src[p.src_index(c, y, x)] = (c * 10 + i + 1) as f32;
                }
            }
            let mut dst = vec![0.0; 3];
            engine.forward(&src, &mut dst);
            assert_eq!(dst, [10.0, 50.0, 90.0], "{:?}", layout);
        }
    }

    #[test]
    fn test_matches_reference() {
        for layout in [Layout::Nchw, Layout::Nhwc] {
            let p = ConvParam::new(13, 5, 6, 13, 1)
                .with_kernel(5, 6)
                .with_group(13)
                .with_layout(layout)
                .with_activation(ActivationKind::Prelu);
            let fixture = Fixture::new(p, 50);
            assert_close(&fixture.run(Strategy::DepthwiseDotProduct), &fixture.expected(), 1e-4);
        }
    }
}
