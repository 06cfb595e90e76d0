//! High-level convolution API.
//!
//! A [`Convolution`] is created once per layer geometry, receives its weights
//! once, and then runs any number of forward passes. All contract checks
//! happen here; the engines below assume valid lengths.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use half::bf16;
use half::slice::HalfFloatSliceExt;

use crate::config::{CacheSizes, ConvOptions};
use crate::conv::{select_strategy, Engine, Strategy};
use crate::error::{ConvError, Result};
use crate::reference::check_len;
use crate::simd::{simd_level, SimdLevel};
use crate::types::ConvParam;

/// A convolution layer bound to one geometry and one execution strategy.
///
/// The handle is immutable during [`forward`](Self::forward), so one layer
/// can serve several threads as long as each brings its own scratch buffer
/// and destination.
///
/// # Example
///
/// ```
/// use synet_conv::{Convolution, ConvParam};
///
/// // 2 channels in, 1 channel out, 3x3 kernel with "same" padding.
/// let p = ConvParam::new(2, 4, 4, 1, 3).with_pad(1, 1, 1, 1);
/// let mut conv = Convolution::new(p).unwrap();
/// conv.set_weights(&vec![1.0; p.weight_size()], None, &[]).unwrap();
///
/// let src = vec![1.0; p.src_size()];
/// let mut buf = vec![0.0f32; conv.external_buffer_size() / 4];
/// let mut dst = vec![0.0; p.dst_size()];
/// conv.forward(&src, &mut buf, &mut dst).unwrap();
///
/// // Corner pixel sees 2x2 taps in each of 2 channels.
/// assert_eq!(dst[0], 8.0);
/// ```
pub struct Convolution {
    param: ConvParam,
    strategy: Strategy,
    engine: Engine,
    weights_set: bool,
}

impl Convolution {
    /// Validate `p` and pick the fastest strategy for this CPU.
    pub fn new(p: ConvParam) -> Result<Self> {
        Self::with_options(p, ConvOptions::default())
    }

    /// Force a strategy; fails if it cannot execute `p`.
    pub fn with_strategy(p: ConvParam, strategy: Strategy) -> Result<Self> {
        Self::with_options(p, ConvOptions::default().strategy(strategy))
    }

    /// Create a convolution with explicit cache sizes, SIMD level or strategy.
    ///
    /// # Arguments
    ///
    /// * `p` - Convolution descriptor, validated here
    /// * `options` - Overrides; unset fields fall back to detection
    ///
    /// # Errors
    ///
    /// Returns the validation error of `p`, [`ConvError::UnavailableLevel`]
    /// for an instruction set this CPU lacks, and
    /// [`ConvError::UnsupportedStrategy`] for a forced strategy that cannot
    /// run `p`.
    pub fn with_options(p: ConvParam, options: ConvOptions) -> Result<Self> {
        p.validate()?;
        let level = match options.level {
            Some(level) if !level.is_available() => return Err(ConvError::UnavailableLevel(level)),
            Some(level) => level,
            None => simd_level(),
        };
        let caches = options.caches.unwrap_or_else(CacheSizes::detect);
        let strategy = match options.strategy {
            Some(strategy) => {
                strategy
                    .check(&p)
                    .map_err(|reason| ConvError::UnsupportedStrategy { strategy, reason })?;
                strategy
            }
            None => select_strategy(&p, level),
        };
        let engine = Engine::new(strategy, &p, level, &caches);
        log::debug!("created {} convolution for {}", strategy, p);
        Ok(Self {
            param: p,
            strategy,
            engine,
            weights_set: false,
        })
    }

    /// Override the cache blocking of a direct NHWC convolution.
    ///
    /// Must be called before [`set_weights`](Self::set_weights) since the
    /// packed weight layout depends on `macro_c`.
    pub fn with_blocks(mut self, macro_c: usize, macro_h: usize, macro_d: usize) -> Result<Self> {
        let p = self.param;
        let alg = self.blocking()?;
        *alg = alg.with_blocks(&p, macro_c, macro_h, macro_d)?;
        Ok(self)
    }

    /// Override the number of output pixels per micro-kernel call.
    pub fn with_kernel_run(mut self, kernel_run: usize) -> Result<Self> {
        let alg = self.blocking()?;
        *alg = alg.with_kernel_run(kernel_run)?;
        Ok(self)
    }

    fn blocking(&mut self) -> Result<&mut crate::core::AlgParam> {
        if self.weights_set {
            return Err(ConvError::InvalidBlocking(
                "blocking must be set before the weights".to_string(),
            ));
        }
        let strategy = self.strategy;
        self.engine.alg_mut().ok_or_else(|| {
            ConvError::InvalidBlocking(format!("strategy {} has no cache blocking", strategy))
        })
    }

    /// Load and repack weights, bias and activation parameters.
    ///
    /// # Arguments
    ///
    /// * `weight` - `weight_size()` values in the layout's weight order
    /// * `bias` - Optional per-output-channel bias of length `dst_c`
    /// * `params` - At least `activation.param_count(dst_c)` activation
    ///   parameters
    ///
    /// May be called again to replace the weights.
    pub fn set_weights(&mut self, weight: &[f32], bias: Option<&[f32]>, params: &[f32]) -> Result<()> {
        check_len("weight", weight.len(), self.param.weight_size())?;
        if let Some(bias) = bias {
            check_len("bias", bias.len(), self.param.dst_c)?;
        }
        self.engine.set_weights(weight, bias, params)?;
        self.weights_set = true;
        Ok(())
    }

    /// Scratch bytes one [`forward`](Self::forward) call needs.
    pub fn external_buffer_size(&self) -> usize {
        self.engine.buffer_len() * std::mem::size_of::<f32>()
    }

    /// Convolve one image.
    ///
    /// # Arguments
    ///
    /// * `src` - `src_size()` values in the configured layout
    /// * `buf` - Scratch of at least [`external_buffer_size`](Self::external_buffer_size) bytes
    /// * `dst` - `dst_size()` values, fully overwritten
    pub fn forward(&self, src: &[f32], buf: &mut [f32], dst: &mut [f32]) -> Result<()> {
        self.check_ready()?;
        check_len("source", src.len(), self.param.src_size())?;
        check_len("destination", dst.len(), self.param.dst_size())?;
        let len = self.engine.buffer_len();
        if buf.len() < len {
            return Err(ConvError::ScratchTooSmall {
                required: len * std::mem::size_of::<f32>(),
                actual: buf.len() * std::mem::size_of::<f32>(),
            });
        }
        log::trace!("forward {} on {}", self.info(), self.param);
        self.engine.forward(src, &mut buf[..len], dst);
        Ok(())
    }

    /// Scratch bytes one [`forward_bf16`](Self::forward_bf16) call needs:
    /// the widened source followed by the regular scratch.
    pub fn bf16_buffer_size(&self) -> usize {
        (self.param.src_size() + self.engine.buffer_len()) * std::mem::size_of::<f32>()
    }

    /// Convolve one bf16 image.
    ///
    /// The source is widened into the front of `buf`, which must hold
    /// [`bf16_buffer_size`](Self::bf16_buffer_size) bytes; no allocation
    /// happens per call.
    pub fn forward_bf16(&self, src: &[bf16], buf: &mut [f32], dst: &mut [f32]) -> Result<()> {
        self.check_ready()?;
        let src_size = self.param.src_size();
        check_len("source", src.len(), src_size)?;
        let required = src_size + self.engine.buffer_len();
        if buf.len() < required {
            return Err(ConvError::ScratchTooSmall {
                required: required * std::mem::size_of::<f32>(),
                actual: buf.len() * std::mem::size_of::<f32>(),
            });
        }
        let (wide, scratch) = buf.split_at_mut(src_size);
        src.convert_to_f32_slice(wide);
        self.forward(wide, scratch, dst)
    }

    /// Convolve all `batch` images, allocating scratch internally.
    ///
    /// With the `parallel` feature images run concurrently, each on its own
    /// destination chunk.
    pub fn forward_batch(&self, src: &[f32], dst: &mut [f32]) -> Result<()> {
        self.check_ready()?;
        let p = &self.param;
        let (src_size, dst_size) = (p.src_size(), p.dst_size());
        check_len("batch source", src.len(), p.batch * src_size)?;
        check_len("batch destination", dst.len(), p.batch * dst_size)?;
        let len = self.engine.buffer_len();
        log::trace!("forward_batch {} x{}", self.info(), p.batch);

        #[cfg(feature = "parallel")]
        {
            src.par_chunks(src_size)
                .zip(dst.par_chunks_mut(dst_size))
                .for_each_init(
                    || vec![0.0f32; len],
                    |buf, (s, d)| self.engine.forward(s, buf, d),
                );
        }

        #[cfg(not(feature = "parallel"))]
        {
            let mut buf = vec![0.0f32; len];
            for (s, d) in src.chunks(src_size).zip(dst.chunks_mut(dst_size)) {
                self.engine.forward(s, &mut buf, d);
            }
        }

        Ok(())
    }

    fn check_ready(&self) -> Result<()> {
        if self.weights_set {
            Ok(())
        } else {
            Err(ConvError::WeightsNotSet)
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn param(&self) -> &ConvParam {
        &self.param
    }

    /// Instruction set of the inner loops.
    pub fn level(&self) -> SimdLevel {
        self.engine.level()
    }

    /// `"<strategy>::<isa>"`, e.g. `"nhwc_direct::avx2"`.
    pub fn info(&self) -> String {
        format!("{}::{}", self.strategy, self.engine.level())
    }
}

/// Create a convolution with the automatically selected strategy.
///
/// # Example
///
/// ```
/// use synet_conv::{create_convolution, ConvParam, Layout};
///
/// let p = ConvParam::new(8, 16, 16, 8, 3).with_layout(Layout::Nchw);
/// let conv = create_convolution(p).unwrap();
/// assert!(conv.strategy().supports(&p));
/// ```
pub fn create_convolution(p: ConvParam) -> Result<Convolution> {
    Convolution::new(p)
}
