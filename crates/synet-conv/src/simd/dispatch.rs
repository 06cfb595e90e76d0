//! Routing from a [`SimdLevel`] to the driver monomorphised for its backend.

use super::backend::{Portable, VectorBackend};
use super::detect::SimdLevel;
use crate::core::driver;
use crate::core::{AlgParam, PackedParams};
use crate::types::ConvParam;

/// `(lanes, register groups, kernel run)` of the backend behind `level`.
pub fn backend_shape(level: SimdLevel) -> (usize, usize, usize) {
    fn shape<B: VectorBackend>() -> (usize, usize, usize) {
        (B::LANES, B::REGISTER_GROUPS, B::KERNEL_RUN)
    }
    match level {
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Avx2 => shape::<super::Avx2>(),
        #[cfg(target_arch = "x86_64")]
        SimdLevel::Sse2 => shape::<super::Sse2>(),
        #[cfg(target_arch = "aarch64")]
        SimdLevel::Neon => shape::<super::Neon>(),
        _ => shape::<Portable>(),
    }
}

/// Run the direct NHWC convolution of one image on `level`.
///
/// `level` must be available on the running CPU, and `alg` must have been
/// planned for [`backend_shape`]`(level)`; both are fixed when the
/// convolution is constructed.
#[allow(clippy::too_many_arguments)]
pub(crate) fn convolve_nhwc_direct(
    level: SimdLevel,
    p: &ConvParam,
    alg: &AlgParam,
    src: &[f32],
    weight: &[f32],
    bias: &[f32],
    params: &PackedParams,
    dst: &mut [f32],
) {
    debug_assert!(level.is_available());
    debug_assert_eq!(alg.lanes, backend_shape(level).0);
    // SAFETY: the level was checked against the running CPU at construction
    // and the buffer lengths against `p` at the API boundary.
    unsafe {
        match level {
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Avx2 => convolve_avx2(p, alg, src, weight, bias, params, dst),
            #[cfg(target_arch = "x86_64")]
            SimdLevel::Sse2 => driver::convolve::<super::Sse2>(p, alg, src, weight, bias, params, dst),
            #[cfg(target_arch = "aarch64")]
            SimdLevel::Neon => driver::convolve::<super::Neon>(p, alg, src, weight, bias, params, dst),
            _ => driver::convolve::<Portable>(p, alg, src, weight, bias, params, dst),
        }
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[allow(clippy::too_many_arguments)]
unsafe fn convolve_avx2(
    p: &ConvParam,
    alg: &AlgParam,
    src: &[f32],
    weight: &[f32],
    bias: &[f32],
    params: &PackedParams,
    dst: &mut [f32],
) {
    driver::convolve::<super::Avx2>(p, alg, src, weight, bias, params, dst)
}
