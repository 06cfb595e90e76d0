//! Error types for convolution setup and execution.

use thiserror::Error;

use crate::conv::Strategy;
use crate::simd::SimdLevel;
use crate::types::ActivationKind;

/// Errors surfaced at the construction, setup and forward boundaries.
#[derive(Debug, Error, PartialEq)]
pub enum ConvError {
    /// A dimension that must be positive is zero.
    #[error("Zero dimension: {0}")]
    ZeroDimension(&'static str),

    /// Channel counts are not divisible by the group count.
    #[error("Group mismatch: src_c={src_c} and dst_c={dst_c} must be divisible by group={group}")]
    GroupMismatch {
        group: usize,
        src_c: usize,
        dst_c: usize,
    },

    /// Kernel, padding and output extents do not describe a convolution.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A caller buffer has the wrong number of elements.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Too few activation parameters.
    #[error("Activation {activation} expects {expected} parameters, got {actual}")]
    ParamCount {
        activation: ActivationKind,
        expected: usize,
        actual: usize,
    },

    /// `forward` called before `set_weights`.
    #[error("Weights are not set")]
    WeightsNotSet,

    /// Scratch buffer smaller than `external_buffer_size`.
    #[error("Scratch buffer too small: required {required} bytes, got {actual}")]
    ScratchTooSmall { required: usize, actual: usize },

    /// A forced strategy cannot run this convolution.
    #[error("Strategy {strategy} does not support this convolution: {reason}")]
    UnsupportedStrategy {
        strategy: Strategy,
        reason: &'static str,
    },

    /// Requested instruction set is missing on this CPU.
    #[error("SIMD level {0} is not available on this CPU")]
    UnavailableLevel(SimdLevel),

    /// Blocking override outside the valid range.
    #[error("Invalid blocking: {0}")]
    InvalidBlocking(String),
}

/// Result type for convolution operations.
pub type Result<T> = std::result::Result<T, ConvError>;
