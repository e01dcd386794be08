//! Convenience helpers for loading sources via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::{OwnedBgrImage, OwnedImage, SourceImage};
use crate::util::{OriMatchError, OriMatchResult};
use std::path::Path;

/// Creates an owned grayscale source from a decoded luma buffer.
pub fn gray_from_image(img: &image::GrayImage) -> OriMatchResult<OwnedImage<u8>> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    OwnedImage::from_vec(img.as_raw().clone(), width, height)
}

/// Creates an owned BGR source from a decoded RGB buffer, swapping channels.
pub fn bgr_from_image(img: &image::RgbImage) -> OriMatchResult<OwnedBgrImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    let mut data = Vec::with_capacity(width * height * 3);
    for px in img.pixels() {
        data.extend_from_slice(&[px.0[2], px.0[1], px.0[0]]);
    }
    OwnedBgrImage::from_vec(data, width, height)
}

/// Loads an image from disk as a grayscale source.
pub fn load_gray_source<P: AsRef<Path>>(path: P) -> OriMatchResult<SourceImage> {
    let img = image::open(path).map_err(|err| OriMatchError::ImageIo {
        reason: err.to_string(),
    })?;
    Ok(SourceImage::Gray(gray_from_image(&img.to_luma8())?))
}

/// Loads an image from disk as a BGR source.
pub fn load_bgr_source<P: AsRef<Path>>(path: P) -> OriMatchResult<SourceImage> {
    let img = image::open(path).map_err(|err| OriMatchError::ImageIo {
        reason: err.to_string(),
    })?;
    Ok(SourceImage::Bgr(bgr_from_image(&img.to_rgb8())?))
}
