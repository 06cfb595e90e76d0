//! Core algorithms: cache blocking, packing, micro-kernels and GEMM.
//!
//! # Direct NHWC Algorithm Overview
//!
//! The register-blocked convolution follows the same hierarchical cache
//! blocking as a BLIS GEMM, with the spatial window taking the place of the
//! depth dimension:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ Loop 4: for dc in 0..dst_c step macro_d  (weights fit L3)         │
//! │   Loop 3: for sc in 0..src_c step macro_c  (term First..Last)     │
//! │     Loop 2: for y in 0..dst_h step macro_h  (source rows fit L2)  │
//! │       Loop 1: for tile in dc block step micro_d                   │
//! │         for row: nose | body runs of kernel_run | tail            │
//! │           kernel::<B, M>(tile, y, x)                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Blocking Parameters
//!
//! [`AlgParam`] holds the blocking sizes chosen by [`plan_blocks`]:
//!
//! | Parameter | Purpose | Bounded by |
//! |-----------|---------|------------|
//! | micro_d | output channels per micro-tile | vector registers |
//! | macro_c | input channels per block | L1 |
//! | macro_h | destination rows per band | L2 |
//! | macro_d | output channels per block | L3 |
//!
//! # Packing
//!
//! - [`pack_weights`]: weights regrouped per input block and output tile
//! - [`pack_bias`]: bias padded to the tile width
//! - [`PackedParams`]: activation parameters, per channel where needed
//!
//! # Epilogue
//!
//! Partial sums of earlier input blocks are stored raw; the last block adds
//! bias and applies the activation while the accumulators are still in
//! registers ([`Term`](crate::types::Term)).
//!
//! # Module Contents
//!
//! - `tiling`: blocking planner and block iteration
//! - `packing`: weight, bias and parameter repacking
//! - `epilogue`: scalar and vector activations
//! - `kernel`: the const-generic micro-kernel
//! - `driver`: the spatial loop nest
//! - `gemm`: portable blocked GEMM used by the GEMM-based strategies

pub(crate) mod driver;
mod epilogue;
mod gemm;
mod kernel;
mod packing;
mod tiling;

pub use epilogue::{
    activate, apply_bias_activation, elu, gelu, hard_sigmoid, hswish, leaky_relu, mish, relu,
    restrict_range, swish,
};
pub use gemm::{sgemm, Transpose};
pub use packing::{pack_bias, pack_weights, packed_weights_size, PackedParams};
pub use tiling::{plan_blocks, AlgParam, BlockIterator, MAX_KERNEL_RUN, MAX_REGISTER_GROUPS};
pub(crate) use tiling::align_up;
