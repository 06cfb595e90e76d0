//! Bias and activation applied to finished accumulators.

use super::packing::PackedParams;
use super::tiling::MAX_REGISTER_GROUPS;
use crate::simd::VectorBackend;
use crate::types::{ActivationKind, ConvParam, Layout, Term};

#[inline(always)]
pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

#[inline(always)]
pub fn leaky_relu(x: f32, slope: f32) -> f32 {
    if x >= 0.0 {
        x
    } else {
        slope * x
    }
}

#[inline(always)]
pub fn restrict_range(x: f32, lower: f32, upper: f32) -> f32 {
    x.max(lower).min(upper)
}

#[inline]
pub fn elu(x: f32, alpha: f32) -> f32 {
    if x >= 0.0 {
        x
    } else {
        alpha * (x.exp() - 1.0)
    }
}

#[inline(always)]
pub fn hard_sigmoid(x: f32, scale: f32, shift: f32) -> f32 {
    (x * scale + shift).min(1.0).max(0.0)
}

#[inline]
pub fn swish(x: f32, slope: f32) -> f32 {
    x / (1.0 + (-slope * x).exp())
}

/// `x * tanh(softplus(x))`, with softplus taken as `x` above `threshold`.
#[inline]
pub fn mish(x: f32, threshold: f32) -> f32 {
    let softplus = if x > threshold { x } else { x.exp().ln_1p() };
    x * softplus.tanh()
}

#[inline]
pub fn gelu(x: f32) -> f32 {
    x * 0.5 * (1.0 + libm::erff(x * std::f32::consts::FRAC_1_SQRT_2))
}

#[inline(always)]
pub fn hswish(x: f32, shift: f32, scale: f32) -> f32 {
    (x.min(shift) + shift).max(0.0) * scale * x
}

/// Activation of one value of output channel `channel`.
#[inline(always)]
pub fn activate(x: f32, params: &PackedParams, channel: usize) -> f32 {
    match params.kind() {
        ActivationKind::Identity => x,
        ActivationKind::Relu => relu(x),
        ActivationKind::LeakyRelu | ActivationKind::Prelu => leaky_relu(x, params.channel(channel)),
        ActivationKind::RestrictRange => restrict_range(x, params.scalar(0), params.scalar(1)),
        ActivationKind::Elu => elu(x, params.scalar(0)),
        ActivationKind::HardSigmoid => hard_sigmoid(x, params.scalar(0), params.scalar(1)),
        ActivationKind::Swish => swish(x, params.scalar(0)),
        ActivationKind::Mish => mish(x, params.scalar(0)),
        ActivationKind::Gelu => gelu(x),
        ActivationKind::Hswish => hswish(x, params.scalar(0), params.scalar(1)),
    }
}

/// Add `bias` and apply the activation to a whole destination image.
pub fn apply_bias_activation(p: &ConvParam, bias: &[f32], params: &PackedParams, dst: &mut [f32]) {
    let area = p.dst_h * p.dst_w;
    debug_assert!(dst.len() >= area * p.dst_c);
    debug_assert!(bias.len() >= p.dst_c);
    match p.layout {
        Layout::Nchw => {
            for (c, plane) in dst.chunks_exact_mut(area).take(p.dst_c).enumerate() {
                let b = bias[c];
                for v in plane.iter_mut() {
                    *v = activate(*v + b, params, c);
                }
            }
        }
        Layout::Nhwc => {
            for pixel in dst.chunks_exact_mut(p.dst_c).take(area) {
                for (c, v) in pixel.iter_mut().enumerate() {
                    *v = activate(*v + bias[c], params, c);
                }
            }
        }
    }
}

/// Vector activation of lanes `[channel, channel + F)`.
#[inline(always)]
pub(crate) unsafe fn activate_vector<B: VectorBackend>(
    v: B::Vector,
    params: &PackedParams,
    channel: usize,
) -> B::Vector {
    match params.kind() {
        ActivationKind::Identity => v,
        ActivationKind::Relu => B::max(v, B::zero()),
        ActivationKind::LeakyRelu | ActivationKind::Prelu => {
            let slope = B::load(params.values().as_ptr().add(channel));
            B::select_non_negative(v, v, B::mul(v, slope))
        }
        ActivationKind::RestrictRange => B::min(
            B::max(v, B::splat(params.scalar(0))),
            B::splat(params.scalar(1)),
        ),
        ActivationKind::HardSigmoid => {
            let y = B::fmadd(v, B::splat(params.scalar(0)), B::splat(params.scalar(1)));
            B::max(B::min(y, B::splat(1.0)), B::zero())
        }
        ActivationKind::Elu => {
            let alpha = params.scalar(0);
            B::map(v, |x| elu(x, alpha))
        }
        ActivationKind::Swish => {
            let slope = params.scalar(0);
            B::map(v, |x| swish(x, slope))
        }
        ActivationKind::Mish => {
            let threshold = params.scalar(0);
            B::map(v, |x| mish(x, threshold))
        }
        ActivationKind::Gelu => B::map(v, gelu),
        ActivationKind::Hswish => {
            let (shift, scale) = (params.scalar(0), params.scalar(1));
            B::map(v, |x| hswish(x, shift, scale))
        }
    }
}

/// Per-call epilogue state shared by every position of a tile.
#[derive(Clone, Copy)]
pub(crate) struct Epilogue<'a> {
    pub term: Term,
    /// Packed bias, padded so a full vector loads at any tile channel.
    pub bias: &'a [f32],
    pub params: &'a PackedParams,
    /// First output channel of the tile.
    pub channel: usize,
    /// Live channels in the tile.
    pub lanes: usize,
}

/// Write one position's accumulators to `dst`.
///
/// Bias and activation run only on the last term; earlier terms store raw
/// partial sums. The last register group stores only its live lanes.
#[inline(always)]
pub(crate) unsafe fn store<B: VectorBackend>(
    dst: *mut f32,
    acc: &[B::Vector; MAX_REGISTER_GROUPS],
    ep: &Epilogue<'_>,
) {
    let f = B::LANES;
    let groups = ep.lanes.div_ceil(f);
    for (g, &sum) in acc.iter().enumerate().take(groups) {
        let channel = ep.channel + g * f;
        let mut v = sum;
        if ep.term.is_last() {
            v = B::add(v, B::load(ep.bias.as_ptr().add(channel)));
            v = activate_vector::<B>(v, ep.params, channel);
        }
        let live = ep.lanes - g * f;
        if live >= f {
            B::store(dst.add(g * f), v);
        } else {
            B::store_partial(dst.add(g * f), v, live);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::Portable;

    const INPUT: [f32; 5] = [-2.0, -1.0, 0.0, 1.0, 2.0];

    fn scalar(kind: ActivationKind, raw: &[f32]) -> Vec<f32> {
        let params = PackedParams::pack(kind, raw, 1, 1).unwrap();
        INPUT.iter().map(|&x| activate(x, &params, 0)).collect()
    }

    #[test]
    fn test_relu_vector() {
        assert_eq!(scalar(ActivationKind::Relu, &[]), [0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_restrict_range_vector() {
        assert_eq!(
            scalar(ActivationKind::RestrictRange, &[0.0, 1.0]),
            [0.0, 0.0, 0.0, 1.0, 1.0]
        );
    }

    #[test]
    fn test_leaky_relu_vector() {
        let out = scalar(ActivationKind::LeakyRelu, &[0.1]);
        let expected = [-0.2, -0.1, 0.0, 1.0, 2.0];
        for (a, b) in out.iter().zip(expected) {
            assert!((a - b).abs() < 1e-7, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_smooth_activations() {
        assert_eq!(elu(1.0, 0.5), 1.0);
        assert!((elu(-1.0, 1.0) - (-0.632_120_56)).abs() < 1e-6);
        assert_eq!(hard_sigmoid(10.0, 0.2, 0.5), 1.0);
        assert_eq!(hard_sigmoid(0.0, 0.2, 0.5), 0.5);
        assert!((swish(1.0, 1.0) - 0.731_058_6).abs() < 1e-6);
        assert!((mish(1.0, 20.0) - 0.865_098_4).abs() < 1e-5);
        assert_eq!(mish(30.0, 20.0), 30.0 * 30.0f32.tanh());
        assert!((gelu(1.0) - 0.841_344_7).abs() < 1e-5);
        assert_eq!(gelu(0.0), 0.0);
        assert_eq!(hswish(-4.0, 3.0, 1.0 / 6.0), 0.0);
        assert_eq!(hswish(4.0, 3.0, 1.0 / 6.0), 4.0);
    }

    #[test]
    fn test_vector_matches_scalar() {
        let raw: &[(ActivationKind, &[f32])] = &[
            (ActivationKind::Identity, &[]),
            (ActivationKind::Relu, &[]),
            (ActivationKind::LeakyRelu, &[0.1]),
            (ActivationKind::RestrictRange, &[-0.5, 0.5]),
            (ActivationKind::Prelu, &[0.1, 0.2, 0.3, 0.4]),
            (ActivationKind::Elu, &[1.0]),
            (ActivationKind::HardSigmoid, &[0.2, 0.5]),
            (ActivationKind::Swish, &[1.0]),
            (ActivationKind::Mish, &[20.0]),
            (ActivationKind::Gelu, &[]),
            (ActivationKind::Hswish, &[3.0, 1.0 / 6.0]),
        ];
        let x = [-1.5f32, -0.25, 0.75, 3.0];
        for &(kind, values) in raw {
            let params = PackedParams::pack(kind, values, 4, 4).unwrap();
            let mut out = [0.0f32; 4];
            unsafe {
                let v = activate_vector::<Portable>(Portable::load(x.as_ptr()), &params, 0);
                Portable::store(out.as_mut_ptr(), v);
            }
            for c in 0..4 {
                let expected = activate(x[c], &params, c);
                assert!((out[c] - expected).abs() <= 1e-6, "{}: {} vs {}", kind, out[c], expected);
            }
        }
    }

    #[test]
    fn test_store_terms() {
        let bias = [1.0f32, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let params = PackedParams::pack(ActivationKind::Relu, &[], 6, 8).unwrap();
        let acc = [[-3.0f32, 2.0, -0.5, 0.5], [4.0, 5.0, 6.0, 7.0], [0.0; 4], [0.0; 4]];

        let mut ep = Epilogue {
            term: Term::First,
            bias: &bias,
            params: &params,
            channel: 0,
            lanes: 6,
        };
        let mut dst = [9.0f32; 8];
        unsafe { store::<Portable>(dst.as_mut_ptr(), &acc, &ep) };
        assert_eq!(dst, [-3.0, 2.0, -0.5, 0.5, 4.0, 5.0, 9.0, 9.0]);

        ep.term = Term::Last;
        let mut dst = [9.0f32; 8];
        unsafe { store::<Portable>(dst.as_mut_ptr(), &acc, &ep) };
        assert_eq!(dst, [0.0, 3.0, 0.5, 1.5, 4.0, 5.0, 9.0, 9.0]);
    }

    #[test]
    fn test_apply_bias_activation_layouts() {
        let params = PackedParams::pack(ActivationKind::Prelu, &[0.5, 0.25], 2, 1).unwrap();
        let bias = [1.0, -1.0];

        let p = ConvParam::new(1, 1, 2, 2, 1);
        let mut nhwc = [-4.0, -4.0, 2.0, 2.0];
        apply_bias_activation(&p, &bias, &params, &mut nhwc);
        assert_eq!(nhwc, [-1.5, -1.25, 3.0, 1.0]);

        let p = p.with_layout(Layout::Nchw);
        let mut nchw = [-4.0, 2.0, -4.0, 2.0];
        apply_bias_activation(&p, &bias, &params, &mut nchw);
        assert_eq!(nchw, [-1.5, 3.0, -1.25, 1.0]);
    }
}
