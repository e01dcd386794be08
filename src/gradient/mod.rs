//! Gradient orientation extraction.
//!
//! Computes per-pixel dominant gradient directions with 3x3 Sobel kernels.
//! Pixels whose squared gradient magnitude falls below the configured
//! threshold, and the 1-pixel image border, carry [`INVALID_ORIENTATION`].
//! Color input runs a per-pixel channel competition on squared magnitude
//! (ties resolved in B, G, R priority order) and uses the winning channel's
//! derivative pair.
//!
//! The grayscale inner loop is generic over [`Intensity`], so one core
//! services every supported pixel depth; the variant is resolved once at the
//! call boundary instead of per pixel. With the `rayon` feature the output is
//! partitioned into horizontal bands, one worker per band; source rows are
//! only ever read, so the 1-pixel halos between bands need no coordination.

use crate::image::{BgrView, ImageView, OwnedImage, SourceImage};
use crate::util::math::orientation_deg;
use crate::util::OriMatchResult;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Sentinel for pixels with no reliable gradient direction.
pub const INVALID_ORIENTATION: i32 = i32::MIN;

/// Pixel depths the grayscale gradient core accepts.
pub trait Intensity: Copy + Send + Sync {
    fn to_f32(self) -> f32;
}

impl Intensity for u8 {
    fn to_f32(self) -> f32 {
        f32::from(self)
    }
}

impl Intensity for i16 {
    fn to_f32(self) -> f32 {
        f32::from(self)
    }
}

impl Intensity for i32 {
    fn to_f32(self) -> f32 {
        self as f32
    }
}

impl Intensity for f32 {
    fn to_f32(self) -> f32 {
        self
    }
}

impl Intensity for f64 {
    fn to_f32(self) -> f32 {
        self as f32
    }
}

/// Orientation image for a grayscale source.
///
/// `min_magnitude` gates on gradient magnitude; the comparison happens on
/// squared values so no square root is taken per pixel.
pub fn gray_orientations<T: Intensity>(
    src: ImageView<'_, T>,
    min_magnitude: i32,
) -> OriMatchResult<OwnedImage<i32>> {
    let width = src.width();
    let height = src.height();
    let mut out = OwnedImage::filled(INVALID_ORIENTATION, width, height)?;
    if width < 3 || height < 3 {
        return Ok(out);
    }

    let min_mag_sq = (min_magnitude as f32) * (min_magnitude as f32);
    fill_interior(out.as_mut_slice(), width, height, |y, out_row| {
        gray_row(src, min_mag_sq, y, out_row);
    });
    Ok(out)
}

/// Orientation image for an interleaved BGR source.
pub fn bgr_orientations(src: BgrView<'_>, min_magnitude: i32) -> OriMatchResult<OwnedImage<i32>> {
    let width = src.width();
    let height = src.height();
    let mut out = OwnedImage::filled(INVALID_ORIENTATION, width, height)?;
    if width < 3 || height < 3 {
        return Ok(out);
    }

    let min_mag_sq = i64::from(min_magnitude) * i64::from(min_magnitude);
    fill_interior(out.as_mut_slice(), width, height, |y, out_row| {
        bgr_row(src, min_mag_sq, y, out_row);
    });
    Ok(out)
}

/// Orientation image for a tagged source, dispatching once on the variant.
pub fn source_orientations(
    src: &SourceImage,
    min_magnitude: i32,
) -> OriMatchResult<OwnedImage<i32>> {
    match src {
        SourceImage::Gray(img) => gray_orientations(img.view(), min_magnitude),
        SourceImage::Bgr(img) => bgr_orientations(img.view(), min_magnitude),
    }
}

/// Runs `row_fn` over every interior output row, banded under `rayon`.
fn fill_interior<F>(out: &mut [i32], width: usize, height: usize, row_fn: F)
where
    F: Fn(usize, &mut [i32]) + Send + Sync,
{
    let interior = &mut out[width..width * (height - 1)];

    #[cfg(feature = "rayon")]
    interior
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(idx, out_row)| row_fn(idx + 1, out_row));

    #[cfg(not(feature = "rayon"))]
    for (idx, out_row) in interior.chunks_mut(width).enumerate() {
        row_fn(idx + 1, out_row);
    }
}

fn gray_row<T: Intensity>(src: ImageView<'_, T>, min_mag_sq: f32, y: usize, out_row: &mut [i32]) {
    let r0 = src.row(y - 1).expect("interior row");
    let r1 = src.row(y).expect("interior row");
    let r2 = src.row(y + 1).expect("interior row");

    for x in 1..src.width() - 1 {
        let tl = r0[x - 1].to_f32();
        let tc = r0[x].to_f32();
        let tr = r0[x + 1].to_f32();
        let ml = r1[x - 1].to_f32();
        let mr = r1[x + 1].to_f32();
        let bl = r2[x - 1].to_f32();
        let bc = r2[x].to_f32();
        let br = r2[x + 1].to_f32();

        let dx = (tr + 2.0 * mr + br) - (tl + 2.0 * ml + bl);
        let dy = (bl + 2.0 * bc + br) - (tl + 2.0 * tc + tr);

        if dx * dx + dy * dy >= min_mag_sq {
            out_row[x] = orientation_deg(dy, dx);
        }
    }
}

fn bgr_row(src: BgrView<'_>, min_mag_sq: i64, y: usize, out_row: &mut [i32]) {
    let r0 = src.row(y - 1).expect("interior row");
    let r1 = src.row(y).expect("interior row");
    let r2 = src.row(y + 1).expect("interior row");

    for x in 1..src.width() - 1 {
        let mut best_mag = -1i64;
        let mut best = (0i32, 0i32);

        // Channel competition: strictly-greater keeps earlier channels on
        // ties, giving the B > G > R priority order.
        for ch in 0..3 {
            let left = (x - 1) * 3 + ch;
            let mid = x * 3 + ch;
            let right = (x + 1) * 3 + ch;

            let dx = (i32::from(r0[right]) + 2 * i32::from(r1[right]) + i32::from(r2[right]))
                - (i32::from(r0[left]) + 2 * i32::from(r1[left]) + i32::from(r2[left]));
            let dy = (i32::from(r2[left]) + 2 * i32::from(r2[mid]) + i32::from(r2[right]))
                - (i32::from(r0[left]) + 2 * i32::from(r0[mid]) + i32::from(r0[right]));

            let mag = i64::from(dx) * i64::from(dx) + i64::from(dy) * i64::from(dy);
            if mag > best_mag {
                best_mag = mag;
                best = (dx, dy);
            }
        }

        if best_mag >= min_mag_sq {
            out_row[x] = orientation_deg(best.1 as f32, best.0 as f32);
        }
    }
}
