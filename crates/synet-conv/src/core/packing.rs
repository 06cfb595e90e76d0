//! Repacking of caller weights, bias and activation parameters into the
//! layouts the kernels read.

use super::tiling::{align_up, AlgParam, BlockIterator};
use crate::error::{ConvError, Result};
use crate::types::{ActivationKind, ConvParam};

/// Size of the packed NHWC-direct weight buffer.
pub fn packed_weights_size(p: &ConvParam, alg: &AlgParam) -> usize {
    alg.tiles(p.dst_c) * alg.micro_d * p.kernel_y * p.kernel_x * p.src_c
}

/// Pack ungrouped weights for the direct NHWC kernels.
///
/// For every input-channel block `[sc, sc + cb)` of `alg.macro_c` channels,
/// in increasing order, and for every output tile of `micro_d` channels:
///
/// ```text
/// [ky][kx][ic in block][micro_d lanes]
/// ```
///
/// Lanes at or beyond `dst_c` are zero. The block starting at `sc` begins at
/// offset `tiles * ky * kx * micro_d * sc`; tile `t` of a block of `cb`
/// channels begins `t * ky * kx * cb * micro_d` into it.
pub fn pack_weights(p: &ConvParam, alg: &AlgParam, weight: &[f32]) -> Vec<f32> {
    debug_assert_eq!(p.group, 1);
    debug_assert_eq!(weight.len(), p.weight_size());
    let micro_d = alg.micro_d;
    let tiles = alg.tiles(p.dst_c);
    let mut packed = vec![0.0f32; packed_weights_size(p, alg)];

    let mut dst = 0;
    for (sc, cb) in BlockIterator::new(p.src_c, alg.macro_c) {
        for tile in 0..tiles {
            let dc = tile * micro_d;
            let lanes = micro_d.min(p.dst_c - dc);
            for ky in 0..p.kernel_y {
                for kx in 0..p.kernel_x {
                    for ic in sc..sc + cb {
                        for lane in 0..lanes {
                            packed[dst + lane] = weight[p.weight_index(dc + lane, ic, ky, kx)];
                        }
                        dst += micro_d;
                    }
                }
            }
        }
    }
    debug_assert_eq!(dst, packed.len());
    packed
}

/// Bias padded with zeros to a multiple of `align`; zero bias when absent.
pub fn pack_bias(bias: Option<&[f32]>, dst_c: usize, align: usize) -> Vec<f32> {
    let mut packed = vec![0.0f32; align_up(dst_c, align.max(1))];
    if let Some(bias) = bias {
        packed[..dst_c].copy_from_slice(&bias[..dst_c]);
    }
    packed
}

/// Activation parameters in kernel order.
///
/// `LeakyRelu` and `Prelu` hold one slope per output channel, padded to the
/// alignment so a whole vector can be loaded at any tile. Every other kind
/// holds at least two scalars, unused ones zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackedParams {
    kind: ActivationKind,
    values: Vec<f32>,
}

impl PackedParams {
    pub fn pack(kind: ActivationKind, raw: &[f32], dst_c: usize, align: usize) -> Result<Self> {
        let expected = kind.param_count(dst_c);
        if raw.len() < expected {
            return Err(ConvError::ParamCount {
                activation: kind,
                expected,
                actual: raw.len(),
            });
        }
        let values = if kind.is_per_channel() {
            let mut v = vec![0.0; align_up(dst_c, align.max(1))];
            if kind == ActivationKind::Prelu {
                v[..dst_c].copy_from_slice(&raw[..dst_c]);
            } else {
                v[..dst_c].fill(raw[0]);
            }
            v
        } else {
            let mut v = vec![0.0; expected.max(2)];
            v[..expected].copy_from_slice(&raw[..expected]);
            v
        };
        Ok(Self { kind, values })
    }

    /// Parameters for an activation that takes none.
    pub fn identity(kind: ActivationKind) -> Self {
        Self {
            kind,
            values: vec![0.0; 2],
        }
    }

    #[inline]
    pub fn kind(&self) -> ActivationKind {
        self.kind
    }

    #[inline]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Global parameter `i` of a non per-channel kind.
    #[inline(always)]
    pub fn scalar(&self, i: usize) -> f32 {
        self.values[i]
    }

    /// Slope of output channel `c` for per-channel kinds.
    #[inline(always)]
    pub fn channel(&self, c: usize) -> f32 {
        self.values[c]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSizes;
    use crate::core::tiling::plan_blocks;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32 + 1.0).collect()
    }

    #[test]
    fn test_pack_weights_single_block() {
        // 2 input channels, 5 output channels, 1x2 kernel, micro_d 4.
        let p = ConvParam::new(2, 3, 3, 5, 1).with_kernel(1, 2);
        let alg = plan_blocks(&p, 4, 1, 4, &CacheSizes::default());
        assert_eq!(alg.macro_c, 2);
        let w = ramp(p.weight_size());
        let packed = pack_weights(&p, &alg, &w);
        assert_eq!(packed.len(), 2 * 4 * 2 * 2);

        // tile 0, kx 1, ic 1
        let at = (2 + 1) * 4;
        for lane in 0..4 {
            assert_eq!(packed[at + lane], w[p.weight_index(lane, 1, 0, 1)]);
        }
        // tile 1 has one live lane
        let tile1 = 2 * 2 * 4;
        assert_eq!(packed[tile1], w[p.weight_index(4, 0, 0, 0)]);
        assert_eq!(&packed[tile1 + 1..tile1 + 4], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pack_weights_split_input_blocks() {
        let p = ConvParam::new(5, 4, 4, 3, 3);
        let alg = plan_blocks(&p, 4, 1, 4, &CacheSizes::default())
            .with_blocks(&p, 2, 1, 4)
            .unwrap();
        let w = ramp(p.weight_size());
        let packed = pack_weights(&p, &alg, &w);
        let area = 9;

        // Block starting at sc = 4 holds one channel.
        let block = alg.tiles(p.dst_c) * area * alg.micro_d * 4;
        let tap = 2 * 3 + 1;
        let at = block + tap * alg.micro_d;
        for lane in 0..3 {
            assert_eq!(packed[at + lane], w[p.weight_index(lane, 4, 2, 1)]);
        }
        assert_eq!(packed[at + 3], 0.0);
    }

    #[test]
    fn test_pack_bias() {
        assert_eq!(pack_bias(Some(&[1.0, 2.0, 3.0]), 3, 4), vec![1.0, 2.0, 3.0, 0.0]);
        assert_eq!(pack_bias(None, 3, 1), vec![0.0; 3]);
    }

    #[test]
    fn test_pack_params() {
        let leaky = PackedParams::pack(ActivationKind::LeakyRelu, &[0.1], 3, 4).unwrap();
        assert_eq!(leaky.values(), &[0.1, 0.1, 0.1, 0.0]);

        let prelu = PackedParams::pack(ActivationKind::Prelu, &[0.1, 0.2, 0.3], 3, 8).unwrap();
        assert_eq!(prelu.values().len(), 8);
        assert_eq!(prelu.channel(2), 0.3);

        let range = PackedParams::pack(ActivationKind::RestrictRange, &[-1.0, 1.0], 3, 4).unwrap();
        assert_eq!((range.scalar(0), range.scalar(1)), (-1.0, 1.0));

        let relu = PackedParams::pack(ActivationKind::Relu, &[], 3, 4).unwrap();
        assert_eq!(relu.values(), &[0.0, 0.0]);
    }

    #[test]
    fn test_pack_params_layout_follows_kind() {
        for kind in ActivationKind::ALL {
            let raw = vec![0.5; kind.param_count(5)];
            let packed = PackedParams::pack(kind, &raw, 5, 4).unwrap();
            if kind.is_per_channel() {
                assert_eq!(packed.values().len(), 8, "{}", kind.name());
                assert!((0..5).all(|c| packed.channel(c) == 0.5));
            } else {
                assert_eq!(packed.values().len(), raw.len().max(2), "{}", kind.name());
            }
        }
    }

    #[test]
    fn test_pack_params_too_few() {
        let err = PackedParams::pack(ActivationKind::Prelu, &[0.1], 3, 4).unwrap_err();
        assert_eq!(
            err,
            ConvError::ParamCount {
                activation: ActivationKind::Prelu,
                expected: 3,
                actual: 1
            }
        );
    }
}
