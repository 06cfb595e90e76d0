//! Property-based tests: every strategy and every blocking computes the same
//! convolution as the scalar reference.

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use synet_conv::{
    reference, ActivationKind, ConvOptions, ConvParam, Convolution, Layout, SimdLevel,
    Strategy as ConvStrategy,
};

// ── Strategies ──────────────────────────────────────────────────────────────

fn arb_activation() -> impl Strategy<Value = ActivationKind> {
    prop_oneof![
        Just(ActivationKind::Identity),
        Just(ActivationKind::Relu),
        Just(ActivationKind::LeakyRelu),
        Just(ActivationKind::RestrictRange),
        Just(ActivationKind::Prelu),
        Just(ActivationKind::Elu),
        Just(ActivationKind::Swish),
    ]
}

fn arb_layout() -> impl Strategy<Value = Layout> {
    prop_oneof![Just(Layout::Nchw), Just(Layout::Nhwc)]
}

/// A valid convolution with small extents.
fn arb_param() -> impl Strategy<Value = ConvParam> {
    (
        (1usize..=6, 1usize..=6, 1usize..=3),
        (1usize..=10, 1usize..=10),
        (1usize..=3, 1usize..=3),
        (1usize..=2, 1usize..=2, 1usize..=2),
        (0usize..=2, 0usize..=2, 0usize..=2, 0usize..=2),
        arb_layout(),
        arb_activation(),
    )
        .prop_map(|((cg, dg, group), (h, w), (ky, kx), (sy, sx, dil), (pt, pl, pb, pr), layout, act)| {
            ConvParam::new(cg * group, h, w, dg * group, 1)
                .with_kernel(ky, kx)
                .with_stride(sy, sx)
                .with_dilation(dil, dil)
                .with_pad(pt, pl, pb, pr)
                .with_group(group)
                .with_layout(layout)
                .with_activation(act)
        })
        .prop_filter("geometry must be valid", |p| p.validate().is_ok())
}

/// A stride-1 NHWC convolution the Winograd and direct NHWC paths accept.
fn arb_dense_nhwc() -> impl Strategy<Value = ConvParam> {
    (1usize..=20, 8usize..=14, 8usize..=14, 1usize..=20, prop_oneof![Just(2usize), Just(3)])
        .prop_map(|(c, h, w, d, k)| {
            let pad = k / 2;
            ConvParam::new(c, h, w, d, k).with_pad(pad, pad, pad, pad)
        })
}

// ── Helpers ─────────────────────────────────────────────────────────────────

struct Data {
    src: Vec<f32>,
    weight: Vec<f32>,
    bias: Vec<f32>,
    params: Vec<f32>,
}

fn random_data(p: &ConvParam, seed: u64) -> Data {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut random = |n: usize| -> Vec<f32> { (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect() };
    let params = match p.activation {
        ActivationKind::RestrictRange => vec![-0.25, 0.75],
        ActivationKind::Prelu => (0..p.dst_c).map(|c| 0.1 + 0.01 * c as f32).collect(),
        kind => vec![0.2; kind.param_count(p.dst_c)],
    };
    Data {
        src: random(p.src_size()),
        weight: random(p.weight_size()),
        bias: random(p.dst_c),
        params,
    }
}

fn expected(p: &ConvParam, data: &Data) -> Vec<f32> {
    let mut dst = vec![0.0; p.dst_size()];
    reference::convolve(p, &data.src, &data.weight, Some(&data.bias), &data.params, &mut dst).unwrap();
    dst
}

fn run(mut conv: Convolution, data: &Data) -> Vec<f32> {
    conv.set_weights(&data.weight, Some(&data.bias), &data.params).unwrap();
    let mut buf = vec![f32::NAN; conv.external_buffer_size() / 4];
    let mut dst = vec![f32::NAN; conv.param().dst_size()];
    conv.forward(&data.src, &mut buf, &mut dst).unwrap();
    dst
}

fn max_error(actual: &[f32], expected: &[f32]) -> f32 {
    actual
        .iter()
        .zip(expected)
        .map(|(a, e)| (a - e).abs() / (1.0 + e.abs()))
        .fold(0.0, f32::max)
}

fn tolerance(strategy: ConvStrategy) -> f32 {
    if strategy == ConvStrategy::Winograd {
        1e-3
    } else {
        1e-4
    }
}

// ── Property tests ───────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every strategy that accepts a geometry agrees with the reference.
    #[test]
    fn supported_strategies_match_reference(p in arb_param(), seed in any::<u64>()) {
        let data = random_data(&p, seed);
        let expected = expected(&p, &data);
        for strategy in ConvStrategy::ALL.into_iter().filter(|s| s.supports(&p)) {
            let conv = Convolution::with_strategy(p, strategy).unwrap();
            let err = max_error(&run(conv, &data), &expected);
            prop_assert!(err <= tolerance(strategy), "{} via {}: error {}", p, strategy, err);
        }
    }

    /// The automatically selected strategy agrees with the reference.
    #[test]
    fn selected_strategy_matches_reference(p in arb_param(), seed in any::<u64>()) {
        let data = random_data(&p, seed);
        let conv = Convolution::new(p).unwrap();
        let strategy = conv.strategy();
        prop_assert!(strategy.supports(&p));
        let err = max_error(&run(conv, &data), &expected(&p, &data));
        prop_assert!(err <= tolerance(strategy), "{} via {}: error {}", p, strategy, err);
    }

    /// Winograd and direct NHWC agree on the dense stride-1 shapes both run.
    #[test]
    fn winograd_matches_direct(p in arb_dense_nhwc(), seed in any::<u64>()) {
        prop_assume!(ConvStrategy::Winograd.supports(&p));
        let data = random_data(&p, seed);
        let expected = expected(&p, &data);
        for strategy in [ConvStrategy::Winograd, ConvStrategy::NhwcDirect] {
            let conv = Convolution::with_strategy(p, strategy).unwrap();
            let err = max_error(&run(conv, &data), &expected);
            prop_assert!(err <= tolerance(strategy), "{} via {}: error {}", p, strategy, err);
        }
    }

    /// Cache blocking and run length never change the direct NHWC result.
    #[test]
    fn blocking_does_not_change_result(
        p in arb_param().prop_filter("ungrouped", |p| p.group == 1),
        (c, h, d, run_len) in (1usize..=6, 1usize..=10, 1usize..=3, 1usize..=14),
        seed in any::<u64>(),
    ) {
        let p = p.with_layout(Layout::Nhwc);
        let data = random_data(&p, seed);
        let options = ConvOptions::default()
            .level(SimdLevel::Portable)
            .strategy(ConvStrategy::NhwcDirect);
        // Portable micro tiles are 8 channels wide.
        let conv = Convolution::with_options(p, options)
            .unwrap()
            .with_blocks(c.min(p.src_c), h.min(p.dst_h), 8 * d)
            .unwrap()
            .with_kernel_run(run_len)
            .unwrap();
        let err = max_error(&run(conv, &data), &expected(&p, &data));
        prop_assert!(err <= 1e-4, "{} blocks ({}, {}, {}) run {}: error {}", p, c, h, 8 * d, run_len, err);
    }
}

#[test]
fn every_level_agrees() {
    let p = ConvParam::new(11, 9, 13, 27, 3)
        .with_pad(1, 1, 1, 1)
        .with_activation(ActivationKind::Prelu);
    let data = random_data(&p, 7);
    let expected = expected(&p, &data);
    for level in SimdLevel::available() {
        let options = ConvOptions::default().level(level).strategy(ConvStrategy::NhwcDirect);
        let conv = Convolution::with_options(p, options).unwrap();
        assert!(max_error(&run(conv, &data), &expected) <= 1e-4, "{}", level);
    }
}
