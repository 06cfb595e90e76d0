use super::{winograd_block, Strategy};
use crate::simd::SimdLevel;
use crate::types::ConvParam;

/// Winograd pays off only with enough input channels to amortise the
/// transforms.
const WINOGRAD_MIN_SRC_C: usize = 16;
/// Images below this extent in both axes go to GEMM-NT when NCHW.
const GEMM_NT_MAX_EXTENT: usize = 6;
const DIRECT_NCHW_MAX_RATIO: f64 = 2.0;

/// Pick the fastest strategy for `p` on `level`. The first matching rule
/// wins; GEMM-NN accepts everything.
pub fn select_strategy(p: &ConvParam, level: SimdLevel) -> Strategy {
    let strategy = if is_depthwise_dot_product(p) {
        Strategy::DepthwiseDotProduct
    } else if is_winograd(p) {
        Strategy::Winograd
    } else if is_gemm_nt(p) {
        Strategy::GemmNT
    } else if is_direct_nchw(p) {
        Strategy::DirectNchw
    } else if is_nhwc_direct(p, level) {
        Strategy::NhwcDirect
    } else {
        Strategy::GemmNN
    };
    log::debug!("selected {} for {} on {}", strategy, p, level);
    strategy
}

fn is_depthwise_dot_product(p: &ConvParam) -> bool {
    Strategy::DepthwiseDotProduct.supports(p)
}

fn is_winograd(p: &ConvParam) -> bool {
    p.group == 1
        && p.is_stride(1)
        && p.is_dilation(1)
        && p.src_c > WINOGRAD_MIN_SRC_C
        && winograd_block(p).is_some()
}

fn is_gemm_nt(p: &ConvParam) -> bool {
    if p.group != 1 {
        return false;
    }
    if p.is_trans() {
        p.dst_c == 1 && p.is_1x1()
    } else {
        p.src_h < GEMM_NT_MAX_EXTENT && p.src_w < GEMM_NT_MAX_EXTENT
    }
}

fn is_direct_nchw(p: &ConvParam) -> bool {
    if p.is_trans() || !p.is_dilation(1) || p.stride_y != p.stride_x || !(1..=3).contains(&p.stride_y) {
        return false;
    }
    if p.kernel_y != p.kernel_x || !(2..=3).contains(&p.kernel_y) {
        return false;
    }
    let ratio = (p.src_c / p.group * p.stride_y * p.stride_x) as f64 / (p.kernel_y * p.kernel_x) as f64;
    ratio < DIRECT_NCHW_MAX_RATIO
}

fn is_nhwc_direct(p: &ConvParam, level: SimdLevel) -> bool {
    if !p.is_trans() || p.group != 1 {
        return false;
    }
    let ratio = (p.src_c * p.stride_y * p.stride_x) as f64 / (p.kernel_y * p.kernel_x) as f64;
    ratio < level.nhwc_direct_ratio()
}
