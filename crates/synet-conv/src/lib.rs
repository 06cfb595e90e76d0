//! Dense 2-D convolution for f32 tensors in NCHW and NHWC layouts.
//!
//! A convolution is described once by a [`ConvParam`]. Creating a
//! [`Convolution`] validates it and picks one of six execution strategies
//! (GEMM-based, Winograd, direct NCHW, depthwise dot product, or the
//! cache-blocked direct NHWC kernels) together with the best vector
//! instruction set of the running CPU. Every strategy computes the same
//! function up to floating point rounding.
//!
//! # Quick Start
//!
//! ```
//! use synet_conv::{ActivationKind, Convolution, ConvParam};
//!
//! let p = ConvParam::new(8, 16, 16, 16, 3)
//!     .with_pad(1, 1, 1, 1)
//!     .with_activation(ActivationKind::Relu);
//!
//! let mut conv = Convolution::new(p)?;
//! conv.set_weights(&vec![0.01; p.weight_size()], Some(&vec![0.0; p.dst_c]), &[])?;
//!
//! let src = vec![1.0f32; p.src_size()];
//! let mut buf = vec![0.0f32; conv.external_buffer_size() / 4];
//! let mut dst = vec![0.0f32; p.dst_size()];
//! conv.forward(&src, &mut buf, &mut dst)?;
//!
//! println!("{} -> {}", conv.info(), dst[0]);
//! # Ok::<(), synet_conv::ConvError>(())
//! ```
//!
//! # Choosing a Strategy
//!
//! [`select_strategy`] applies fixed geometry rules; see [`conv`] for the
//! table. [`Convolution::with_strategy`] forces one and
//! [`Convolution::with_options`] also pins the SIMD level or cache sizes.
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `SYNET_CONV_SIMD_MAX` | Highest instruction set to use (`portable`, `sse2`, `neon`, `avx2`) |
//! | `SYNET_CONV_L1`, `SYNET_CONV_L2`, `SYNET_CONV_L3` | Cache sizes for the blocking planner |
//!
//! # Features
//!
//! - `parallel` (default): [`Convolution::forward_batch`] runs images on the
//!   rayon thread pool

pub mod api;
pub mod config;
pub mod conv;
pub mod core;
pub mod error;
pub mod reference;
pub mod simd;
pub mod types;

pub use api::{create_convolution, Convolution};
pub use config::{CacheSizes, ConvOptions};
pub use conv::{select_strategy, Strategy};
pub use error::{ConvError, Result};
pub use simd::{simd_level, SimdLevel};
pub use types::{ActivationKind, ConvParam, Layout, Term};
