//! Straightforward convolution with every access bounds checked.
//!
//! Slow by construction; it exists to check the optimised strategies.
//! Accumulates in f64.

use crate::core::{activate, PackedParams};
use crate::error::{ConvError, Result};
use crate::types::ConvParam;

/// Convolve one image of `p` in its own layout.
///
/// `weight` uses the layout's weight order, `params` the raw activation
/// parameters accepted by [`Convolution::set_weights`](crate::Convolution::set_weights).
pub fn convolve(
    p: &ConvParam,
    src: &[f32],
    weight: &[f32],
    bias: Option<&[f32]>,
    params: &[f32],
    dst: &mut [f32],
) -> Result<()> {
    p.validate()?;
    check_len("source", src.len(), p.src_size())?;
    check_len("weight", weight.len(), p.weight_size())?;
    check_len("destination", dst.len(), p.dst_size())?;
    if let Some(bias) = bias {
        check_len("bias", bias.len(), p.dst_c)?;
    }
    let params = PackedParams::pack(p.activation, params, p.dst_c, 1)?;

    let src_cg = p.src_c / p.group;
    let dst_cg = p.dst_c / p.group;
    for oc in 0..p.dst_c {
        let g = oc / dst_cg;
        for dy in 0..p.dst_h {
            for dx in 0..p.dst_w {
                let mut sum = 0.0f64;
                for icg in 0..src_cg {
                    for ky in 0..p.kernel_y {
                        let Some(sy) = p.src_y(dy, ky) else { continue };
                        for kx in 0..p.kernel_x {
                            let Some(sx) = p.src_x(dx, kx) else { continue };
                            let s = src[p.src_index(g * src_cg + icg, sy, sx)];
                            let w = weight[p.weight_index(oc, icg, ky, kx)];
                            sum += s as f64 * w as f64;
                        }
                    }
                }
                let value = sum as f32 + bias.map_or(0.0, |b| b[oc]);
                dst[p.dst_index(oc, dy, dx)] = activate(value, &params, oc);
            }
        }
    }
    Ok(())
}

pub(crate) fn check_len(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(ConvError::DimensionMismatch(format!(
            "{} has {} elements, expected {}",
            what, actual, expected
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivationKind, Layout};

    #[test]
    fn test_hand_computed() {
        // 3x3 source, 2x2 kernel of ones: each output sums a 2x2 window.
        let p = ConvParam::new(1, 3, 3, 1, 2);
        let src: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let mut dst = vec![0.0; 4];
        convolve(&p, &src, &[1.0; 4], Some(&[-12.0]), &[], &mut dst).unwrap();
        assert_eq!(dst, [0.0, 4.0, 12.0, 16.0]);
    }

    #[test]
    fn test_padding_and_activation() {
        let p = ConvParam::new(1, 2, 2, 1, 3)
            .with_pad(1, 1, 1, 1)
            .with_activation(ActivationKind::Relu)
            .with_layout(Layout::Nchw);
        let mut dst = vec![0.0; 4];
        convolve(&p, &[1.0, -2.0, 3.0, -4.0], &[1.0; 9], None, &[], &mut dst).unwrap();
        // Every window covers the whole source.
        assert_eq!(dst, [0.0; 4]);
        convolve(&p, &[1.0, 2.0, 3.0, 4.0], &[1.0; 9], None, &[], &mut dst).unwrap();
        assert_eq!(dst, [10.0; 4]);
    }

    #[test]
    fn test_grouped_channels_stay_separate() {
        let p = ConvParam::new(2, 1, 1, 2, 1).with_group(2);
        let mut dst = vec![0.0; 2];
        convolve(&p, &[3.0, 5.0], &[2.0, 10.0], None, &[], &mut dst).unwrap();
        assert_eq!(dst, [6.0, 50.0]);
    }

    #[test]
    fn test_length_errors() {
        let p = ConvParam::new(1, 3, 3, 1, 2);
        let mut dst = vec![0.0; 4];
        assert!(matches!(
            convolve(&p, &[0.0; 8], &[1.0; 4], None, &[], &mut dst),
            Err(ConvError::DimensionMismatch(_))
        ));
        assert!(matches!(
            convolve(&p, &[0.0; 9], &[1.0; 4], Some(&[]), &[], &mut dst),
            Err(ConvError::DimensionMismatch(_))
        ));
    }
}
