//! Convolution descriptor types.
//!
//! This module defines the immutable description of one convolution and the
//! small closed enums that drive the execution engine.
//!
//! # Convolution Geometry
//!
//! For a source of `src_h × src_w` pixels with `src_c` channels, a kernel of
//! `kernel_y × kernel_x` taps, stride `s`, dilation `d` and four-sided padding
//! the destination extent follows the standard output-size formula:
//!
//! ```text
//! dst_h = (src_h + pad_y + pad_h - (dilation_y * (kernel_y - 1) + 1)) / stride_y + 1
//! dst_w = (src_w + pad_x + pad_w - (dilation_x * (kernel_x - 1) + 1)) / stride_x + 1
//! ```
//!
//! # Layouts
//!
//! | Layout | Source / destination | Weights |
//! |--------|----------------------|---------|
//! | [`Layout::Nchw`] | `[c][y][x]` | `[dst_c][src_c/group][ky][kx]` |
//! | [`Layout::Nhwc`] | `[y][x][c]` | `[ky][kx][src_c/group][dst_c]` |
//!
//! # Core Types
//!
//! - [`ConvParam`]: the convolution descriptor with builder and validation
//! - [`ActivationKind`]: fused activation applied by the epilogue
//! - [`Term`]: position of a micro-kernel call in the input-channel block chain
//!
//! # Example
//!
//! ```rust
//! use synet_conv::types::{ActivationKind, ConvParam, Layout};
//!
//! let p = ConvParam::new(16, 32, 32, 8, 3)
//!     .with_pad(1, 1, 1, 1)
//!     .with_activation(ActivationKind::Relu)
//!     .with_layout(Layout::Nhwc);
//!
//! assert_eq!((p.dst_h, p.dst_w), (32, 32));
//! assert!(p.validate().is_ok());
//! ```

mod activation;
mod param;
mod term;

pub use activation::ActivationKind;
pub use param::{ConvParam, Layout};
pub use term::Term;
