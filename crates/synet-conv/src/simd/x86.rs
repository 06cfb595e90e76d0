//! SSE2 and AVX2 backends.
//!
//! SSE2 is part of the x86_64 baseline. The AVX2 backend must only be driven
//! from code entered through a `#[target_feature(enable = "avx2,fma")]`
//! function after runtime detection (see [`crate::simd::dispatch`]).

use std::arch::x86_64::*;

use super::backend::VectorBackend;

/// 128-bit backend, FMA emulated with multiply + add.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sse2;

impl VectorBackend for Sse2 {
    type Vector = __m128;

    const LANES: usize = 4;
    const REGISTER_GROUPS: usize = 2;
    const KERNEL_RUN: usize = 6;

    #[inline(always)]
    unsafe fn zero() -> __m128 {
        _mm_setzero_ps()
    }

    #[inline(always)]
    unsafe fn splat(value: f32) -> __m128 {
        _mm_set1_ps(value)
    }

    #[inline(always)]
    unsafe fn load(ptr: *const f32) -> __m128 {
        _mm_loadu_ps(ptr)
    }

    #[inline(always)]
    unsafe fn store(ptr: *mut f32, v: __m128) {
        _mm_storeu_ps(ptr, v)
    }

    #[inline(always)]
    unsafe fn add(a: __m128, b: __m128) -> __m128 {
        _mm_add_ps(a, b)
    }

    #[inline(always)]
    unsafe fn mul(a: __m128, b: __m128) -> __m128 {
        _mm_mul_ps(a, b)
    }

    #[inline(always)]
    unsafe fn fmadd(a: __m128, b: __m128, c: __m128) -> __m128 {
        _mm_add_ps(_mm_mul_ps(a, b), c)
    }

    #[inline(always)]
    unsafe fn max(a: __m128, b: __m128) -> __m128 {
        _mm_max_ps(a, b)
    }

    #[inline(always)]
    unsafe fn min(a: __m128, b: __m128) -> __m128 {
        _mm_min_ps(a, b)
    }

    #[inline(always)]
    unsafe fn select_non_negative(v: __m128, a: __m128, b: __m128) -> __m128 {
        let mask = _mm_cmpge_ps(v, _mm_setzero_ps());
        _mm_or_ps(_mm_and_ps(mask, a), _mm_andnot_ps(mask, b))
    }
}

/// 256-bit backend with fused multiply-add.
#[derive(Debug, Clone, Copy, Default)]
pub struct Avx2;

impl VectorBackend for Avx2 {
    type Vector = __m256;

    const LANES: usize = 8;
    const REGISTER_GROUPS: usize = 2;
    const KERNEL_RUN: usize = 6;

    #[inline(always)]
    unsafe fn zero() -> __m256 {
        _mm256_setzero_ps()
    }

    #[inline(always)]
    unsafe fn splat(value: f32) -> __m256 {
        _mm256_set1_ps(value)
    }

    #[inline(always)]
    unsafe fn load(ptr: *const f32) -> __m256 {
        _mm256_loadu_ps(ptr)
    }

    #[inline(always)]
    unsafe fn store(ptr: *mut f32, v: __m256) {
        _mm256_storeu_ps(ptr, v)
    }

    #[inline(always)]
    unsafe fn add(a: __m256, b: __m256) -> __m256 {
        _mm256_add_ps(a, b)
    }

    #[inline(always)]
    unsafe fn mul(a: __m256, b: __m256) -> __m256 {
        _mm256_mul_ps(a, b)
    }

    #[inline(always)]
    unsafe fn fmadd(a: __m256, b: __m256, c: __m256) -> __m256 {
        _mm256_fmadd_ps(a, b, c)
    }

    #[inline(always)]
    unsafe fn max(a: __m256, b: __m256) -> __m256 {
        _mm256_max_ps(a, b)
    }

    #[inline(always)]
    unsafe fn min(a: __m256, b: __m256) -> __m256 {
        _mm256_min_ps(a, b)
    }

    #[inline(always)]
    unsafe fn select_non_negative(v: __m256, a: __m256, b: __m256) -> __m256 {
        let mask = _mm256_cmp_ps::<_CMP_GE_OQ>(v, _mm256_setzero_ps());
        _mm256_blendv_ps(b, a, mask)
    }
}
