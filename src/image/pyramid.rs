//! Pyramid downsampling for template training and query preprocessing.
//!
//! Each pyramid step halves both dimensions with a 2x2 box filter and integer
//! rounding: `dst = (a + b + c + d + 2) / 4`. Orientation quantization works
//! on 45-degree buckets, so the box filter is an adequate stand-in for a
//! Gaussian step and keeps the levels exactly reproducible.

use crate::image::{OwnedBgrImage, OwnedImage, SourceImage};
use crate::util::{OriMatchError, OriMatchResult};

/// Downsamples a grayscale image by 2x in both dimensions.
pub fn downsample_gray(src: &OwnedImage<u8>) -> OriMatchResult<OwnedImage<u8>> {
    let view = src.view();
    let dst_width = view.width() / 2;
    let dst_height = view.height() / 2;
    if dst_width == 0 || dst_height == 0 {
        return Err(OriMatchError::InvalidDimensions {
            width: dst_width,
            height: dst_height,
        });
    }

    let mut dst = vec![0u8; dst_width * dst_height];
    for y in 0..dst_height {
        let row0 = view.row(y * 2).expect("source row in range");
        let row1 = view.row(y * 2 + 1).expect("source row in range");
        for x in 0..dst_width {
            let sum = u16::from(row0[2 * x])
                + u16::from(row0[2 * x + 1])
                + u16::from(row1[2 * x])
                + u16::from(row1[2 * x + 1]);
            dst[y * dst_width + x] = ((sum + 2) / 4) as u8;
        }
    }
    OwnedImage::from_vec(dst, dst_width, dst_height)
}

/// Downsamples a BGR image by 2x, box-filtering each channel independently.
pub fn downsample_bgr(src: &OwnedBgrImage) -> OriMatchResult<OwnedBgrImage> {
    let view = src.view();
    let dst_width = view.width() / 2;
    let dst_height = view.height() / 2;
    if dst_width == 0 || dst_height == 0 {
        return Err(OriMatchError::InvalidDimensions {
            width: dst_width,
            height: dst_height,
        });
    }

    let mut dst = vec![0u8; dst_width * dst_height * 3];
    for y in 0..dst_height {
        let row0 = view.row(y * 2).expect("source row in range");
        let row1 = view.row(y * 2 + 1).expect("source row in range");
        for x in 0..dst_width {
            for ch in 0..3 {
                let left = 6 * x + ch;
                let right = left + 3;
                let sum = u16::from(row0[left])
                    + u16::from(row0[right])
                    + u16::from(row1[left])
                    + u16::from(row1[right]);
                dst[(y * dst_width + x) * 3 + ch] = ((sum + 2) / 4) as u8;
            }
        }
    }
    OwnedBgrImage::from_vec(dst, dst_width, dst_height)
}

impl SourceImage {
    /// Returns the next-coarser pyramid level of this source.
    pub fn downsample(&self) -> OriMatchResult<SourceImage> {
        match self {
            SourceImage::Gray(img) => Ok(SourceImage::Gray(downsample_gray(img)?)),
            SourceImage::Bgr(img) => Ok(SourceImage::Bgr(downsample_bgr(img)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downsample_gray_averages_quads_with_rounding() {
        let data = vec![0u8, 2, 10, 10, 4, 2, 10, 10];
        let src = OwnedImage::from_vec(data, 4, 2).unwrap();
        let dst = downsample_gray(&src).unwrap();
        assert_eq!(dst.width(), 2);
        assert_eq!(dst.height(), 1);
        // (0 + 2 + 4 + 2 + 2) / 4 = 2 and (10 * 4 + 2) / 4 = 10
        assert_eq!(dst.as_slice(), &[2, 10]);
    }

    #[test]
    fn downsample_gray_rejects_single_row() {
        let src = OwnedImage::from_vec(vec![1u8, 2, 3, 4], 4, 1).unwrap();
        assert!(matches!(
            downsample_gray(&src),
            Err(OriMatchError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn downsample_bgr_keeps_channels_independent() {
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&[10u8, 20, 30]);
        }
        let src = OwnedBgrImage::from_vec(data, 2, 2).unwrap();
        let dst = downsample_bgr(&src).unwrap();
        assert_eq!(dst.view().row(0).unwrap(), &[10, 20, 30]);
    }
}
