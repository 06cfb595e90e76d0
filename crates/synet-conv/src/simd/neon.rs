//! NEON backend (aarch64).

use std::arch::aarch64::*;

use super::backend::VectorBackend;

/// 128-bit backend with three register groups: aarch64 has 32 vector
/// registers, enough for 6×3 accumulators plus weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct Neon;

impl VectorBackend for Neon {
    type Vector = float32x4_t;

    const LANES: usize = 4;
    const REGISTER_GROUPS: usize = 3;
    const KERNEL_RUN: usize = 6;

    #[inline(always)]
    unsafe fn zero() -> float32x4_t {
        vdupq_n_f32(0.0)
    }

    #[inline(always)]
    unsafe fn splat(value: f32) -> float32x4_t {
        vdupq_n_f32(value)
    }

    #[inline(always)]
    unsafe fn load(ptr: *const f32) -> float32x4_t {
        vld1q_f32(ptr)
    }

    #[inline(always)]
    unsafe fn store(ptr: *mut f32, v: float32x4_t) {
        vst1q_f32(ptr, v)
    }

    #[inline(always)]
    unsafe fn add(a: float32x4_t, b: float32x4_t) -> float32x4_t {
        vaddq_f32(a, b)
    }

    #[inline(always)]
    unsafe fn mul(a: float32x4_t, b: float32x4_t) -> float32x4_t {
        vmulq_f32(a, b)
    }

    #[inline(always)]
    unsafe fn fmadd(a: float32x4_t, b: float32x4_t, c: float32x4_t) -> float32x4_t {
        vfmaq_f32(c, a, b)
    }

    #[inline(always)]
    unsafe fn max(a: float32x4_t, b: float32x4_t) -> float32x4_t {
        vmaxnmq_f32(a, b)
    }

    #[inline(always)]
    unsafe fn min(a: float32x4_t, b: float32x4_t) -> float32x4_t {
        vminnmq_f32(a, b)
    }

    #[inline(always)]
    unsafe fn select_non_negative(v: float32x4_t, a: float32x4_t, b: float32x4_t) -> float32x4_t {
        vbslq_f32(vcgeq_f32(v, vdupq_n_f32(0.0)), a, b)
    }
}
