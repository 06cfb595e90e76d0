//! Vector backends for the register-blocked convolution kernels.
//!
//! The planner, the spatial driver and the micro-kernel are written once
//! against the [`VectorBackend`] trait; each instruction set only provides the
//! handful of vector primitives the kernel needs.
//!
//! # Supported Architectures
//!
//! | Architecture | Backend | Lanes (F) | Register groups | Run length |
//! |--------------|---------|-----------|-----------------|------------|
//! | x86_64 | [`Avx2`] (AVX2 + FMA) | 8 | 2 | 6 |
//! | x86_64 | [`Sse2`] | 4 | 2 | 6 |
//! | aarch64 | [`Neon`] | 4 | 3 | 6 |
//! | Any | [`Portable`] | 4 | 2 | 4 |
//!
//! # Runtime Dispatch
//!
//! 1. [`simd_level()`] detects CPU features once and applies the
//!    `SYNET_CONV_SIMD_MAX` ceiling
//! 2. A convolution stores its [`SimdLevel`] at construction time
//! 3. [`dispatch`] routes each forward call to the driver monomorphised for
//!    that level
//!
//! # Module Contents
//!
//! - `detect`: CPU feature detection ([`SimdLevel`])
//! - [`backend`]: the [`VectorBackend`] trait and [`Portable`]
//! - [`dispatch`]: level → backend routing

pub mod backend;
mod detect;
pub mod dispatch;

#[cfg(target_arch = "aarch64")]
mod neon;
#[cfg(target_arch = "x86_64")]
mod x86;

pub use backend::{Portable, VectorBackend, MAX_LANES};
pub use detect::{simd_level, SimdLevel};
#[cfg(target_arch = "aarch64")]
pub use neon::Neon;
#[cfg(target_arch = "x86_64")]
pub use x86::{Avx2, Sse2};
