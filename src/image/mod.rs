//! Image views and owned buffers for the matching pipeline.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. The view is generic
//! over the element type: the pipeline moves through `u8` intensity images,
//! `i32` orientation images and `u8` orientation-mask images with the same
//! accessors. Raw pointers never cross the public API; callers hand in slices
//! and the constructors validate the geometry up front.

use crate::util::{OriMatchError, OriMatchResult};

pub mod pyramid;

#[cfg(feature = "image-io")]
pub mod io;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> OriMatchResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> OriMatchResult<Self> {
        let needed = required_len(width, height, stride, 1)?;
        if data.len() < needed {
            return Err(OriMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.stride + x)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width)
    }
}

/// Owned contiguous image buffer.
pub struct OwnedImage<T> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Copy> OwnedImage<T> {
    /// Creates an owned image from a contiguous buffer of exactly
    /// `width * height` elements.
    pub fn from_vec(data: Vec<T>, width: usize, height: usize) -> OriMatchResult<Self> {
        let needed = required_len(width, height, width, 1)?;
        if data.len() < needed {
            return Err(OriMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(OriMatchError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Creates an image filled with a constant value.
    pub fn filled(value: T, width: usize, height: usize) -> OriMatchResult<Self> {
        let needed = required_len(width, height, width, 1)?;
        Ok(Self {
            data: vec![value; needed],
            width,
            height,
        })
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, T> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the backing buffer in row-major order.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Borrowed 3-channel interleaved BGR view; stride counts bytes.
#[derive(Copy, Clone)]
pub struct BgrView<'a> {
    data: &'a [u8],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a> BgrView<'a> {
    /// Creates a contiguous BGR view with `stride == 3 * width`.
    pub fn from_slice(data: &'a [u8], width: usize, height: usize) -> OriMatchResult<Self> {
        Self::new(data, width, height, width * 3)
    }

    /// Creates a BGR view with an explicit byte stride.
    pub fn new(data: &'a [u8], width: usize, height: usize, stride: usize) -> OriMatchResult<Self> {
        let needed = required_len(width, height, stride, 3)?;
        if data.len() < needed {
            return Err(OriMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns row `y` as interleaved BGR bytes, length `3 * width`.
    pub fn row(&self, y: usize) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width * 3)
    }
}

/// Owned contiguous BGR image.
pub struct OwnedBgrImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl OwnedBgrImage {
    /// Creates an owned BGR image from exactly `3 * width * height` bytes.
    pub fn from_vec(data: Vec<u8>, width: usize, height: usize) -> OriMatchResult<Self> {
        let needed = required_len(width, height, width * 3, 3)?;
        if data.len() != needed {
            return Err(OriMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> BgrView<'_> {
        BgrView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width * 3,
        }
    }
}

/// Owned source image fed into template training and detection.
///
/// The variant is resolved once at the pipeline boundary; the gradient
/// extractor dispatches to the matching inner loop.
pub enum SourceImage {
    Gray(OwnedImage<u8>),
    Bgr(OwnedBgrImage),
}

fn required_len(
    width: usize,
    height: usize,
    stride: usize,
    pixel_size: usize,
) -> OriMatchResult<usize> {
    if width == 0 || height == 0 {
        return Err(OriMatchError::InvalidDimensions { width, height });
    }
    if stride < width * pixel_size {
        return Err(OriMatchError::InvalidStride { width, stride });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width * pixel_size))
        .ok_or(OriMatchError::InvalidDimensions { width, height })
}
