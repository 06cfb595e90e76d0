//! Cache blocking for the direct NHWC convolution.

use crate::config::CacheSizes;
use crate::error::{ConvError, Result};
use crate::types::ConvParam;

/// Longest spatial run a micro-kernel specialisation exists for.
pub const MAX_KERNEL_RUN: usize = 14;
/// Most output-channel register groups per micro-tile.
pub const MAX_REGISTER_GROUPS: usize = 4;

const F32_BYTES: usize = std::mem::size_of::<f32>();

#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

#[inline]
pub(crate) const fn align_down(value: usize, align: usize) -> usize {
    value / align * align
}

/// Derived execution parameters of one direct NHWC convolution.
///
/// | Field | Meaning | Sized against |
/// |-------|---------|---------------|
/// | `micro_d` | output channels per micro-tile (`lanes × register_groups`) | registers |
/// | `macro_c` | input channels per block | L1 |
/// | `macro_h` | destination rows per band | L2 |
/// | `macro_d` | output channels per block | L3 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgParam {
    /// Vector width F.
    pub lanes: usize,
    pub register_groups: usize,
    pub micro_d: usize,
    pub macro_c: usize,
    pub macro_h: usize,
    pub macro_d: usize,
    /// Positions per body kernel call.
    pub kernel_run: usize,
    /// Destination columns `[0, nose_w)` read left padding.
    pub nose_w: usize,
    /// Destination columns `[nose_w, body_w)` read only the source.
    pub body_w: usize,
}

/// First output coordinate whose window starts inside the source.
fn nose(pad: usize, stride: usize, dst: usize) -> usize {
    pad.div_ceil(stride).min(dst)
}

/// One past the last output coordinate whose window ends inside the source.
fn body_end(src: usize, pad: usize, kernel: usize, dilation: usize, stride: usize, dst: usize, nose: usize) -> usize {
    let reach = (kernel - 1) * dilation;
    match (src + pad).checked_sub(reach + 1) {
        Some(last) => (last / stride + 1).min(dst).max(nose),
        None => nose,
    }
}

/// Compute block sizes for `p` on a backend with `lanes`-wide vectors.
///
/// - `macro_c`: one input block's weights for one micro-tile fit L1
/// - `macro_h`: the source rows one band reads, for `macro_c` channels, fit L2
/// - `macro_d`: the weight slab of one output block over `macro_c` fits L3
pub fn plan_blocks(
    p: &ConvParam,
    lanes: usize,
    register_groups: usize,
    kernel_run: usize,
    caches: &CacheSizes,
) -> AlgParam {
    let micro_d = lanes * register_groups;
    let kernel_area = p.kernel_y * p.kernel_x;

    let macro_c = (caches.l1 / F32_BYTES / kernel_area / micro_d).clamp(1, p.src_c);

    let rows_in_l2 = caches.l2 / F32_BYTES / macro_c / p.src_w;
    let halo = p.kernel_y * p.dilation_y - 1;
    let macro_h = match rows_in_l2.checked_sub(halo) {
        Some(free) => (free / p.stride_y).clamp(1, p.dst_h),
        None => 1,
    };

    let macro_d = align_down(caches.l3 / F32_BYTES / kernel_area / macro_c, micro_d)
        .clamp(micro_d, align_up(p.dst_c, micro_d));

    let nose_w = nose(p.pad_x, p.stride_x, p.dst_w);
    let alg = AlgParam {
        lanes,
        register_groups,
        micro_d,
        macro_c,
        macro_h,
        macro_d,
        kernel_run: kernel_run.clamp(1, MAX_KERNEL_RUN),
        nose_w,
        body_w: body_end(p.src_w, p.pad_x, p.kernel_x, p.dilation_x, p.stride_x, p.dst_w, nose_w),
    };
    log::debug!(
        "planned blocks for {}: micro_d={} macro_c={} macro_h={} macro_d={} run={}",
        p,
        alg.micro_d,
        alg.macro_c,
        alg.macro_h,
        alg.macro_d,
        alg.kernel_run
    );
    alg
}

impl AlgParam {
    /// Replace the cache block sizes.
    ///
    /// Blocking is a performance parameter: any valid choice produces the
    /// same output.
    pub fn with_blocks(mut self, p: &ConvParam, macro_c: usize, macro_h: usize, macro_d: usize) -> Result<Self> {
        if macro_c == 0 || macro_c > p.src_c {
            return Err(ConvError::InvalidBlocking(format!(
                "macro_c={} outside 1..={}",
                macro_c, p.src_c
            )));
        }
        if macro_h == 0 || macro_h > p.dst_h {
            return Err(ConvError::InvalidBlocking(format!(
                "macro_h={} outside 1..={}",
                macro_h, p.dst_h
            )));
        }
        if macro_d == 0 || macro_d % self.micro_d != 0 {
            return Err(ConvError::InvalidBlocking(format!(
                "macro_d={} is not a positive multiple of micro_d={}",
                macro_d, self.micro_d
            )));
        }
        self.macro_c = macro_c;
        self.macro_h = macro_h;
        self.macro_d = macro_d.min(align_up(p.dst_c, self.micro_d));
        Ok(self)
    }

    /// Replace the body run length.
    pub fn with_kernel_run(mut self, kernel_run: usize) -> Result<Self> {
        if kernel_run == 0 || kernel_run > MAX_KERNEL_RUN {
            return Err(ConvError::InvalidBlocking(format!(
                "kernel_run={} outside 1..={}",
                kernel_run, MAX_KERNEL_RUN
            )));
        }
        self.kernel_run = kernel_run;
        Ok(self)
    }

    /// Number of `micro_d`-wide output tiles covering `dst_c`.
    #[inline]
    pub fn tiles(&self, dst_c: usize) -> usize {
        dst_c.div_ceil(self.micro_d)
    }
}

/// Iterator over `(start, len)` blocks of `step` covering `0..total`.
#[derive(Debug, Clone)]
pub struct BlockIterator {
    total: usize,
    step: usize,
    current: usize,
}

impl BlockIterator {
    pub fn new(total: usize, step: usize) -> Self {
        assert!(step > 0, "block step must be positive");
        Self {
            total,
            step,
            current: 0,
        }
    }
}

impl Iterator for BlockIterator {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current >= self.total {
            return None;
        }
        let start = self.current;
        let len = self.step.min(self.total - start);
        self.current += len;
        Some((start, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_iterator() {
        let blocks: Vec<_> = BlockIterator::new(10, 4).collect();
        assert_eq!(blocks, vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(BlockIterator::new(0, 4).count(), 0);
        assert_eq!(BlockIterator::new(4, 4).collect::<Vec<_>>(), vec![(0, 4)]);
    }

    #[test]
    fn test_align() {
        assert_eq!(align_up(13, 8), 16);
        assert_eq!(align_up(16, 8), 16);
        assert_eq!(align_down(13, 8), 8);
    }

    #[test]
    fn test_plan_respects_caches() {
        let p = ConvParam::new(64, 56, 56, 96, 3).with_pad(1, 1, 1, 1);
        let caches = CacheSizes::new(32 * 1024, 256 * 1024, 2 * 1024 * 1024);
        let a = plan_blocks(&p, 8, 2, 6, &caches);

        assert_eq!(a.micro_d, 16);
        // 32K / 4 / 9 / 16 = 56
        assert_eq!(a.macro_c, 56);
        assert!(a.macro_c * 9 * a.micro_d * 4 <= caches.l1);
        let rows = a.macro_h * p.stride_y + p.kernel_y * p.dilation_y - 1;
        assert!(a.macro_c * p.src_w * rows * 4 <= caches.l2);
        assert_eq!(a.macro_d % a.micro_d, 0);
        assert!(a.macro_d >= a.micro_d && a.macro_d <= 96);
    }

    #[test]
    fn test_plan_small_problem_clamps() {
        let p = ConvParam::new(3, 5, 5, 5, 3);
        let a = plan_blocks(&p, 4, 2, 4, &CacheSizes::default());
        assert_eq!(a.macro_c, 3);
        assert_eq!(a.macro_h, p.dst_h);
        assert_eq!(a.macro_d, 8);
        assert_eq!(a.tiles(p.dst_c), 1);
    }

    #[test]
    fn test_plan_tiny_l2_keeps_one_row() {
        let p = ConvParam::new(8, 64, 64, 8, 5);
        let a = plan_blocks(&p, 4, 2, 4, &CacheSizes::new(1024, 64, 4096));
        assert_eq!(a.macro_h, 1);
        assert!(a.macro_c >= 1);
    }

    #[test]
    fn test_nose_body_tail() {
        // k=3, pad=1: column 0 reads padding, the last column reads padding.
        let p = ConvParam::new(4, 7, 9, 4, 3).with_pad(1, 1, 1, 1);
        let a = plan_blocks(&p, 4, 2, 4, &CacheSizes::default());
        assert_eq!((a.nose_w, a.body_w), (1, 8));

        // No padding: everything is body.
        let p = ConvParam::new(4, 7, 9, 4, 3);
        let a = plan_blocks(&p, 4, 2, 4, &CacheSizes::default());
        assert_eq!((a.nose_w, a.body_w), (0, p.dst_w));

        // Stride 2, pad 2 on the left only.
        let p = ConvParam::new(4, 9, 9, 4, 3).with_stride(2, 2).with_pad(0, 2, 0, 0);
        let a = plan_blocks(&p, 4, 2, 4, &CacheSizes::default());
        assert_eq!(a.nose_w, 1);
        assert_eq!(a.body_w, p.dst_w);
    }

    #[test]
    fn test_kernel_wider_than_source_has_no_body() {
        let p = ConvParam::new(1, 3, 3, 1, 5).with_pad(2, 2, 2, 2);
        let a = plan_blocks(&p, 4, 1, 4, &CacheSizes::default());
        assert_eq!(a.nose_w, 2);
        assert_eq!(a.body_w, 2);
    }

    #[test]
    fn test_with_blocks_validation() {
        let p = ConvParam::new(12, 8, 8, 20, 3);
        let a = plan_blocks(&p, 4, 2, 4, &CacheSizes::default());
        assert!(a.with_blocks(&p, 5, 2, 8).is_ok());
        assert!(a.with_blocks(&p, 0, 2, 8).is_err());
        assert!(a.with_blocks(&p, 13, 2, 8).is_err());
        assert!(a.with_blocks(&p, 4, 7, 8).is_err());
        assert!(a.with_blocks(&p, 4, 2, 12).is_err());
        assert_eq!(a.with_blocks(&p, 4, 2, 64).unwrap().macro_d, 24);
        assert!(a.with_kernel_run(14).is_ok());
        assert!(a.with_kernel_run(15).is_err());
    }
}
