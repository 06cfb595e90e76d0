//! Convolution strategies and their selection.
//!
//! | Strategy | Layouts | Applies to |
//! |----------|---------|------------|
//! | [`Strategy::DepthwiseDotProduct`] | both | depthwise, kernel covers the whole source |
//! | [`Strategy::Winograd`] | both | 1×3, 1×5, 2×2, 3×3 kernels, stride 1, many channels |
//! | [`Strategy::GemmNT`] | both | tiny NCHW images, NHWC 1×1 to one channel |
//! | [`Strategy::DirectNchw`] | NCHW | small 2×2 / 3×3 kernels with few channels |
//! | [`Strategy::NhwcDirect`] | NHWC | ungrouped, few channels per tap |
//! | [`Strategy::GemmNN`] | both | everything |
//!
//! Every strategy computes the same function up to floating point rounding;
//! [`select_strategy`] only decides which one is fastest.

mod depthwise;
mod direct_nchw;
mod gemm_nn;
mod gemm_nt;
mod nhwc_direct;
mod select;
mod winograd;

use std::fmt;

use crate::config::CacheSizes;
use crate::core::AlgParam;
use crate::error::Result;
use crate::simd::SimdLevel;
use crate::types::ConvParam;

pub use select::select_strategy;
pub use winograd::winograd_block;

use depthwise::DepthwiseDotProduct;
use direct_nchw::DirectNchw;
use gemm_nn::GemmNN;
use gemm_nt::GemmNT;
use nhwc_direct::NhwcDirect;
use winograd::Winograd;

/// Algorithm family executing a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// im2col / im2row followed by `C = A · B`.
    GemmNN,
    /// Row matrix multiplied transposed, `C = W · Rowᵀ`.
    GemmNT,
    /// Toom-Cook fast convolution.
    Winograd,
    /// Plane accumulation for NCHW.
    DirectNchw,
    /// One dot product per channel.
    DepthwiseDotProduct,
    /// Cache-blocked, register-blocked direct kernels for NHWC.
    NhwcDirect,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::GemmNN,
        Strategy::GemmNT,
        Strategy::Winograd,
        Strategy::DirectNchw,
        Strategy::DepthwiseDotProduct,
        Strategy::NhwcDirect,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Strategy::GemmNN => "gemm_nn",
            Strategy::GemmNT => "gemm_nt",
            Strategy::Winograd => "winograd",
            Strategy::DirectNchw => "direct_nchw",
            Strategy::DepthwiseDotProduct => "depthwise",
            Strategy::NhwcDirect => "nhwc_direct",
        }
    }

    /// Whether this strategy can execute `p` at all, regardless of speed.
    pub fn supports(self, p: &ConvParam) -> bool {
        self.check(p).is_ok()
    }

    /// The first hard precondition `p` violates.
    pub(crate) fn check(self, p: &ConvParam) -> std::result::Result<(), &'static str> {
        match self {
            Strategy::GemmNN => Ok(()),
            Strategy::GemmNT => {
                if p.group != 1 {
                    Err("grouped convolution")
                } else if p.is_trans() && !(p.is_1x1() && p.dst_c == 1) {
                    Err("NHWC needs a 1x1 convolution to one channel")
                } else {
                    Ok(())
                }
            }
            Strategy::Winograd => {
                if p.group != 1 {
                    Err("grouped convolution")
                } else if !p.is_stride(1) || !p.is_dilation(1) {
                    Err("stride and dilation must be 1")
                } else if winograd_block(p).is_none() {
                    Err("no transform for this kernel and output size")
                } else {
                    Ok(())
                }
            }
            Strategy::DirectNchw => {
                if p.is_trans() {
                    Err("NCHW layout only")
                } else {
                    Ok(())
                }
            }
            Strategy::DepthwiseDotProduct => {
                if !p.is_depthwise() {
                    Err("not depthwise")
                } else if !p.is_pad(0) || !p.is_stride(1) || !p.is_dilation(1) {
                    Err("padding, stride or dilation")
                } else if p.kernel_y != p.src_h || p.kernel_x != p.src_w {
                    Err("kernel must cover the whole source")
                } else {
                    Ok(())
                }
            }
            Strategy::NhwcDirect => {
                if !p.is_trans() {
                    Err("NHWC layout only")
                } else if p.group != 1 {
                    Err("grouped convolution")
                } else {
                    Ok(())
                }
            }
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Convolution state of the selected strategy.
pub(crate) enum Engine {
    GemmNN(GemmNN),
    GemmNT(GemmNT),
    Winograd(Winograd),
    DirectNchw(DirectNchw),
    Depthwise(DepthwiseDotProduct),
    NhwcDirect(NhwcDirect),
}

impl Engine {
    /// Build the engine for a strategy that supports `p`.
    pub fn new(strategy: Strategy, p: &ConvParam, level: SimdLevel, caches: &CacheSizes) -> Self {
        match strategy {
            Strategy::GemmNN => Engine::GemmNN(GemmNN::new(p)),
            Strategy::GemmNT => Engine::GemmNT(GemmNT::new(p)),
            Strategy::Winograd => Engine::Winograd(Winograd::new(p)),
            Strategy::DirectNchw => Engine::DirectNchw(DirectNchw::new(p)),
            Strategy::DepthwiseDotProduct => Engine::Depthwise(DepthwiseDotProduct::new(p)),
            Strategy::NhwcDirect => Engine::NhwcDirect(NhwcDirect::new(p, level, caches)),
        }
    }

    /// Repack caller weights. `weight` and `bias` lengths are already checked.
    pub fn set_weights(&mut self, weight: &[f32], bias: Option<&[f32]>, params: &[f32]) -> Result<()> {
        match self {
            Engine::GemmNN(e) => e.set_weights(weight, bias, params),
            Engine::GemmNT(e) => e.set_weights(weight, bias, params),
            Engine::Winograd(e) => e.set_weights(weight, bias, params),
            Engine::DirectNchw(e) => e.set_weights(weight, bias, params),
            Engine::Depthwise(e) => e.set_weights(weight, bias, params),
            Engine::NhwcDirect(e) => e.set_weights(weight, bias, params),
        }
    }

    /// Scratch floats one forward call needs.
    pub fn buffer_len(&self) -> usize {
        match self {
            Engine::GemmNN(e) => e.buffer_len(),
            Engine::GemmNT(e) => e.buffer_len(),
            Engine::Winograd(e) => e.buffer_len(),
            Engine::DirectNchw(_) | Engine::Depthwise(_) | Engine::NhwcDirect(_) => 0,
        }
    }

    /// Convolve one image. Lengths are already checked.
    pub fn forward(&self, src: &[f32], buf: &mut [f32], dst: &mut [f32]) {
        match self {
            Engine::GemmNN(e) => e.forward(src, buf, dst),
            Engine::GemmNT(e) => e.forward(src, buf, dst),
            Engine::Winograd(e) => e.forward(src, buf, dst),
            Engine::DirectNchw(e) => e.forward(src, dst),
            Engine::Depthwise(e) => e.forward(src, dst),
            Engine::NhwcDirect(e) => e.forward(src, dst),
        }
    }

    /// Instruction set the engine's inner loops run on.
    pub fn level(&self) -> SimdLevel {
        match self {
            Engine::NhwcDirect(e) => e.level(),
            _ => SimdLevel::Portable,
        }
    }

    /// Blocking of the direct NHWC engine.
    pub fn alg_mut(&mut self) -> Option<&mut AlgParam> {
        match self {
            Engine::NhwcDirect(e) => Some(e.alg_mut()),
            _ => None,
        }
    }
}
