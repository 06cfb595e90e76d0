use std::fmt;

/// Activation fused into the convolution epilogue.
///
/// Parameters arrive as a flat `&[f32]` at setup time; their meaning per kind
/// is listed next to each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ActivationKind {
    /// `x`
    #[default]
    Identity,
    /// `max(x, 0)`
    Relu,
    /// `x >= 0 ? x : slope * x`; params `[slope]`.
    LeakyRelu,
    /// `clamp(x, lower, upper)`; params `[lower, upper]`.
    RestrictRange,
    /// `x >= 0 ? x : slope[c] * x`; one slope per output channel.
    Prelu,
    /// `x >= 0 ? x : alpha * (exp(x) - 1)`; params `[alpha]`.
    Elu,
    /// `clamp(x * scale + shift, 0, 1)`; params `[scale, shift]`.
    HardSigmoid,
    /// `x * sigmoid(slope * x)`; params `[slope]`.
    Swish,
    /// `x * tanh(softplus(x))` with softplus linear above `threshold`; params `[threshold]`.
    Mish,
    /// `x * Phi(x)` using the erf-based Gaussian CDF.
    Gelu,
    /// `max(min(x, shift) + shift, 0) * scale * x`; params `[shift, scale]`.
    Hswish,
}

impl ActivationKind {
    /// All supported kinds.
    pub const ALL: [ActivationKind; 11] = [
        ActivationKind::Identity,
        ActivationKind::Relu,
        ActivationKind::LeakyRelu,
        ActivationKind::RestrictRange,
        ActivationKind::Prelu,
        ActivationKind::Elu,
        ActivationKind::HardSigmoid,
        ActivationKind::Swish,
        ActivationKind::Mish,
        ActivationKind::Gelu,
        ActivationKind::Hswish,
    ];

    /// Number of raw parameters expected by `set_weights`.
    pub const fn param_count(self, dst_c: usize) -> usize {
        match self {
            ActivationKind::Identity | ActivationKind::Relu | ActivationKind::Gelu => 0,
            ActivationKind::LeakyRelu
            | ActivationKind::Elu
            | ActivationKind::Swish
            | ActivationKind::Mish => 1,
            ActivationKind::RestrictRange
            | ActivationKind::HardSigmoid
            | ActivationKind::Hswish => 2,
            ActivationKind::Prelu => dst_c,
        }
    }

    /// Parameters are stored per output channel after packing.
    pub const fn is_per_channel(self) -> bool {
        matches!(self, ActivationKind::LeakyRelu | ActivationKind::Prelu)
    }

    pub const fn name(self) -> &'static str {
        match self {
            ActivationKind::Identity => "identity",
            ActivationKind::Relu => "relu",
            ActivationKind::LeakyRelu => "leaky_relu",
            ActivationKind::RestrictRange => "restrict_range",
            ActivationKind::Prelu => "prelu",
            ActivationKind::Elu => "elu",
            ActivationKind::HardSigmoid => "hard_sigmoid",
            ActivationKind::Swish => "swish",
            ActivationKind::Mish => "mish",
            ActivationKind::Gelu => "gelu",
            ActivationKind::Hswish => "hswish",
        }
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_counts() {
        assert_eq!(ActivationKind::Identity.param_count(7), 0);
        assert_eq!(ActivationKind::LeakyRelu.param_count(7), 1);
        assert_eq!(ActivationKind::RestrictRange.param_count(7), 2);
        assert_eq!(ActivationKind::Prelu.param_count(7), 7);
        assert_eq!(ActivationKind::Hswish.param_count(7), 2);
    }

    #[test]
    fn test_per_channel_kinds() {
        let per_channel: Vec<_> = ActivationKind::ALL
            .iter()
            .filter(|k| k.is_per_channel())
            .collect();
        assert_eq!(per_channel, [&ActivationKind::LeakyRelu, &ActivationKind::Prelu]);
    }
}
