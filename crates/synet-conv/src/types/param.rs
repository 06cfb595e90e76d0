use std::fmt;

use super::ActivationKind;
use crate::error::{ConvError, Result};

/// Memory order of source, destination and weight tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    /// Channel-first.
    Nchw,
    /// Channel-last ("trans").
    #[default]
    Nhwc,
}

/// Immutable description of one convolution.
///
/// `dst_h` and `dst_w` are derived from the other fields by every builder
/// method; [`ConvParam::validate`] rejects descriptors whose stored extents
/// disagree with the output-size formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvParam {
    pub batch: usize,
    pub src_c: usize,
    pub src_h: usize,
    pub src_w: usize,
    pub dst_c: usize,
    pub dst_h: usize,
    pub dst_w: usize,
    pub kernel_y: usize,
    pub kernel_x: usize,
    pub dilation_y: usize,
    pub dilation_x: usize,
    pub stride_y: usize,
    pub stride_x: usize,
    /// Top padding.
    pub pad_y: usize,
    /// Left padding.
    pub pad_x: usize,
    /// Bottom padding.
    pub pad_h: usize,
    /// Right padding.
    pub pad_w: usize,
    pub group: usize,
    pub activation: ActivationKind,
    pub layout: Layout,
}

/// Output extent along one axis, or `None` when the dilated kernel does not
/// fit the padded source.
fn output_extent(src: usize, pad_before: usize, pad_after: usize, kernel: usize, dilation: usize, stride: usize) -> Option<usize> {
    if kernel == 0 || dilation == 0 || stride == 0 {
        return None;
    }
    let span = dilation * (kernel - 1) + 1;
    let padded = src + pad_before + pad_after;
    if padded < span {
        return None;
    }
    Some((padded - span) / stride + 1)
}

impl ConvParam {
    /// Square `kernel`, stride 1, dilation 1, no padding, one group, NHWC,
    /// identity activation, batch 1.
    pub fn new(src_c: usize, src_h: usize, src_w: usize, dst_c: usize, kernel: usize) -> Self {
        let mut p = Self {
            batch: 1,
            src_c,
            src_h,
            src_w,
            dst_c,
            dst_h: 0,
            dst_w: 0,
            kernel_y: kernel,
            kernel_x: kernel,
            dilation_y: 1,
            dilation_x: 1,
            stride_y: 1,
            stride_x: 1,
            pad_y: 0,
            pad_x: 0,
            pad_h: 0,
            pad_w: 0,
            group: 1,
            activation: ActivationKind::Identity,
            layout: Layout::Nhwc,
        };
        p.update_output();
        p
    }

    pub fn with_kernel(mut self, kernel_y: usize, kernel_x: usize) -> Self {
        self.kernel_y = kernel_y;
        self.kernel_x = kernel_x;
        self.update_output();
        self
    }

    pub fn with_stride(mut self, stride_y: usize, stride_x: usize) -> Self {
        self.stride_y = stride_y;
        self.stride_x = stride_x;
        self.update_output();
        self
    }

    pub fn with_dilation(mut self, dilation_y: usize, dilation_x: usize) -> Self {
        self.dilation_y = dilation_y;
        self.dilation_x = dilation_x;
        self.update_output();
        self
    }

    /// Padding in top, left, bottom, right order.
    pub fn with_pad(mut self, top: usize, left: usize, bottom: usize, right: usize) -> Self {
        self.pad_y = top;
        self.pad_x = left;
        self.pad_h = bottom;
        self.pad_w = right;
        self.update_output();
        self
    }

    pub fn with_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    pub fn with_activation(mut self, activation: ActivationKind) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    fn update_output(&mut self) {
        self.dst_h = output_extent(self.src_h, self.pad_y, self.pad_h, self.kernel_y, self.dilation_y, self.stride_y)
            .unwrap_or(0);
        self.dst_w = output_extent(self.src_w, self.pad_x, self.pad_w, self.kernel_x, self.dilation_x, self.stride_x)
            .unwrap_or(0);
    }

    /// Check the structural invariants of the descriptor.
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("batch", self.batch),
            ("src_c", self.src_c),
            ("src_h", self.src_h),
            ("src_w", self.src_w),
            ("dst_c", self.dst_c),
            ("kernel_y", self.kernel_y),
            ("kernel_x", self.kernel_x),
            ("dilation_y", self.dilation_y),
            ("dilation_x", self.dilation_x),
            ("stride_y", self.stride_y),
            ("stride_x", self.stride_x),
            ("group", self.group),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(ConvError::ZeroDimension(name));
        }
        if self.src_c % self.group != 0 || self.dst_c % self.group != 0 {
            return Err(ConvError::GroupMismatch {
                group: self.group,
                src_c: self.src_c,
                dst_c: self.dst_c,
            });
        }
        let dst_h = output_extent(self.src_h, self.pad_y, self.pad_h, self.kernel_y, self.dilation_y, self.stride_y);
        let dst_w = output_extent(self.src_w, self.pad_x, self.pad_w, self.kernel_x, self.dilation_x, self.stride_x);
        match (dst_h, dst_w) {
            (Some(h), Some(w)) if h == self.dst_h && w == self.dst_w => Ok(()),
            (Some(h), Some(w)) => Err(ConvError::InvalidGeometry(format!(
                "destination {}x{} does not match computed {}x{}",
                self.dst_h, self.dst_w, h, w
            ))),
            _ => Err(ConvError::InvalidGeometry(format!(
                "dilated kernel {}x{} does not fit padded source {}x{}",
                self.dilation_y * (self.kernel_y - 1) + 1,
                self.dilation_x * (self.kernel_x - 1) + 1,
                self.src_h + self.pad_y + self.pad_h,
                self.src_w + self.pad_x + self.pad_w
            ))),
        }
    }

    #[inline]
    pub fn is_trans(&self) -> bool {
        self.layout == Layout::Nhwc
    }

    #[inline]
    pub fn is_kernel(&self, k: usize) -> bool {
        self.kernel_y == k && self.kernel_x == k
    }

    #[inline]
    pub fn is_stride(&self, s: usize) -> bool {
        self.stride_y == s && self.stride_x == s
    }

    #[inline]
    pub fn is_dilation(&self, d: usize) -> bool {
        self.dilation_y == d && self.dilation_x == d
    }

    #[inline]
    pub fn is_pad(&self, v: usize) -> bool {
        self.pad_y == v && self.pad_x == v && self.pad_h == v && self.pad_w == v
    }

    /// Pointwise convolution that maps every pixel to itself.
    #[inline]
    pub fn is_1x1(&self) -> bool {
        self.is_kernel(1) && self.is_stride(1) && self.is_dilation(1) && self.is_pad(0)
    }

    #[inline]
    pub fn is_depthwise(&self) -> bool {
        self.group == self.src_c && self.group == self.dst_c
    }

    /// Elements of one source image.
    #[inline]
    pub fn src_size(&self) -> usize {
        self.src_c * self.src_h * self.src_w
    }

    /// Elements of one destination image.
    #[inline]
    pub fn dst_size(&self) -> usize {
        self.dst_c * self.dst_h * self.dst_w
    }

    #[inline]
    pub fn weight_size(&self) -> usize {
        self.kernel_y * self.kernel_x * self.src_c / self.group * self.dst_c
    }

    /// Offset of source element `(c, y, x)`.
    #[inline(always)]
    pub fn src_index(&self, c: usize, y: usize, x: usize) -> usize {
        match self.layout {
            Layout::Nchw => (c * self.src_h + y) * self.src_w + x,
            Layout::Nhwc => (y * self.src_w + x) * self.src_c + c,
        }
    }

    /// Offset of destination element `(c, y, x)`.
    #[inline(always)]
    pub fn dst_index(&self, c: usize, y: usize, x: usize) -> usize {
        match self.layout {
            Layout::Nchw => (c * self.dst_h + y) * self.dst_w + x,
            Layout::Nhwc => (y * self.dst_w + x) * self.dst_c + c,
        }
    }

    /// Offset of the weight connecting output channel `oc` to the in-group
    /// input channel `icg` at tap `(ky, kx)`.
    #[inline(always)]
    pub fn weight_index(&self, oc: usize, icg: usize, ky: usize, kx: usize) -> usize {
        let src_cg = self.src_c / self.group;
        match self.layout {
            Layout::Nchw => ((oc * src_cg + icg) * self.kernel_y + ky) * self.kernel_x + kx,
            Layout::Nhwc => ((ky * self.kernel_x + kx) * src_cg + icg) * self.dst_c + oc,
        }
    }

    /// Source coordinate read by output coordinate `d` at tap `k`, or `None`
    /// when it falls into the padding.
    #[inline(always)]
    pub fn src_y(&self, dy: usize, ky: usize) -> Option<usize> {
        (dy * self.stride_y + ky * self.dilation_y)
            .checked_sub(self.pad_y)
            .filter(|&sy| sy < self.src_h)
    }

    #[inline(always)]
    pub fn src_x(&self, dx: usize, kx: usize) -> Option<usize> {
        (dx * self.stride_x + kx * self.dilation_x)
            .checked_sub(self.pad_x)
            .filter(|&sx| sx < self.src_w)
    }
}

impl fmt::Display for ConvParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}x{} -> {}x{}x{} k={}x{} s={}x{} d={}x{} p={},{},{},{} g={} {} {:?}",
            self.src_c,
            self.src_h,
            self.src_w,
            self.dst_c,
            self.dst_h,
            self.dst_w,
            self.kernel_y,
            self.kernel_x,
            self.stride_y,
            self.stride_x,
            self.dilation_y,
            self.dilation_x,
            self.pad_y,
            self.pad_x,
            self.pad_h,
            self.pad_w,
            self.group,
            self.activation,
            self.layout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size_same_padding() {
        let p = ConvParam::new(8, 10, 12, 4, 3).with_pad(1, 1, 1, 1);
        assert_eq!((p.dst_h, p.dst_w), (10, 12));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_output_size_stride_dilation() {
        let p = ConvParam::new(3, 17, 17, 4, 3).with_stride(2, 2).with_dilation(2, 2);
        // span = 5, (17 - 5) / 2 + 1 = 7
        assert_eq!((p.dst_h, p.dst_w), (7, 7));
    }

    #[test]
    fn test_builder_order_independent() {
        let a = ConvParam::new(3, 9, 9, 4, 3).with_stride(2, 2).with_pad(1, 1, 1, 1);
        let b = ConvParam::new(3, 9, 9, 4, 3).with_pad(1, 1, 1, 1).with_stride(2, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_zero_dimension() {
        let p = ConvParam::new(0, 4, 4, 4, 1);
        assert_eq!(p.validate(), Err(ConvError::ZeroDimension("src_c")));
    }

    #[test]
    fn test_validate_group_mismatch() {
        let p = ConvParam::new(6, 4, 4, 4, 1).with_group(3);
        assert!(matches!(p.validate(), Err(ConvError::GroupMismatch { group: 3, .. })));
    }

    #[test]
    fn test_validate_kernel_too_large() {
        let p = ConvParam::new(2, 2, 2, 2, 3);
        assert!(matches!(p.validate(), Err(ConvError::InvalidGeometry(_))));
    }

    #[test]
    fn test_validate_inconsistent_destination() {
        let mut p = ConvParam::new(2, 8, 8, 2, 3);
        p.dst_w += 1;
        assert!(matches!(p.validate(), Err(ConvError::InvalidGeometry(_))));
    }

    #[test]
    fn test_indexing_layouts() {
        let nchw = ConvParam::new(3, 4, 5, 2, 1).with_layout(Layout::Nchw);
        let nhwc = ConvParam::new(3, 4, 5, 2, 1);
        assert_eq!(nchw.src_index(2, 1, 3), 2 * 20 + 5 + 3);
        assert_eq!(nhwc.src_index(2, 1, 3), (5 + 3) * 3 + 2);
        assert_eq!(nchw.weight_index(1, 2, 0, 0), 5);
        assert_eq!(nhwc.weight_index(1, 2, 0, 0), 2 * 2 + 1);
    }

    #[test]
    fn test_source_coordinates() {
        let p = ConvParam::new(1, 5, 5, 1, 3).with_pad(1, 1, 1, 1);
        assert_eq!(p.src_y(0, 0), None);
        assert_eq!(p.src_y(0, 1), Some(0));
        assert_eq!(p.src_x(4, 2), None);
        assert_eq!(p.src_x(4, 1), Some(4));
    }

    #[test]
    fn test_predicates() {
        let p = ConvParam::new(4, 6, 6, 4, 1);
        assert!(p.is_1x1());
        assert!(!p.with_pad(1, 1, 1, 1).is_1x1());
        assert!(p.with_group(4).is_depthwise());
        assert_eq!(ConvParam::new(4, 6, 6, 8, 3).with_group(2).weight_size(), 9 * 2 * 8);
    }
}
