//! Quantized orientation maps.
//!
//! Turns a degree-valued orientation image into the 8-bit mask image the
//! matcher consumes, in three steps: table quantization to 8 buckets, a 3x3
//! majority vote that keeps only locally coherent orientations, and optional
//! spreading that ORs masks over a neighborhood window so a feature tolerates
//! small misalignments at match time.

use crate::gradient::INVALID_ORIENTATION;
use crate::image::{ImageView, OwnedImage};
use crate::util::OriMatchResult;

/// Number of quantized gradient directions. Hard ceiling: orientations are
/// one-hot bits of a single byte.
pub const NUM_ORIENTATIONS: usize = 8;

/// Bucket code for pixels without a reliable orientation. Excluded from all
/// neighborhood voting.
pub const INVALID_QUANTIZATION: u8 = NUM_ORIENTATIONS as u8;

/// Minimum votes (of 9) the winning bucket needs in the 3x3 majority vote.
const MIN_VOTES: u8 = 4;

/// Lookup from whole degrees `0..=360` to orientation buckets `0..=7`.
///
/// `round(deg * 16 / 360) & 7` folds opposite directions onto the same
/// bucket modulo the 16-step circle, so 360 wraps back to bucket 0.
const QUANTIZATION_TABLE: [u8; 361] = build_quantization_table();

const fn build_quantization_table() -> [u8; 361] {
    let mut table = [0u8; 361];
    let mut deg = 0usize;
    while deg <= 360 {
        table[deg] = (((deg * 16 + 180) / 360) & 7) as u8;
        deg += 1;
    }
    table
}

/// Quantizes a degree-valued orientation image into bucket codes.
///
/// Valid degrees map to `0..=7`; the invalid sentinel (and any out-of-range
/// value, defensively) maps to [`INVALID_QUANTIZATION`].
pub fn quantize(orientations: ImageView<'_, i32>) -> OriMatchResult<OwnedImage<u8>> {
    let width = orientations.width();
    let height = orientations.height();
    let mut out = OwnedImage::filled(INVALID_QUANTIZATION, width, height)?;
    let buf = out.as_mut_slice();

    for y in 0..height {
        let row = orientations.row(y).expect("row in range");
        let out_row = &mut buf[y * width..(y + 1) * width];
        for (dst, &deg) in out_row.iter_mut().zip(row) {
            if deg != INVALID_ORIENTATION && (0..=360).contains(&deg) {
                *dst = QUANTIZATION_TABLE[deg as usize];
            }
        }
    }
    Ok(out)
}

/// 3x3 majority vote over bucket codes, emitting one-hot orientation bytes.
///
/// An interior pixel with a valid code survives when one bucket collects at
/// least 4 of the 9 neighborhood votes; the output is then `1 << bucket`.
/// Everything else, including the 1-pixel border, is 0. Ties go to the lower
/// bucket index.
pub fn majority_vote(codes: ImageView<'_, u8>) -> OriMatchResult<OwnedImage<u8>> {
    let width = codes.width();
    let height = codes.height();
    let mut out = OwnedImage::filled(0u8, width, height)?;
    if width < 3 || height < 3 {
        return Ok(out);
    }
    let buf = out.as_mut_slice();

    for y in 1..height - 1 {
        let rows = [
            codes.row(y - 1).expect("interior row"),
            codes.row(y).expect("interior row"),
            codes.row(y + 1).expect("interior row"),
        ];
        let out_row = &mut buf[y * width..(y + 1) * width];

        for x in 1..width - 1 {
            if rows[1][x] >= INVALID_QUANTIZATION {
                continue;
            }

            let mut votes = [0u8; NUM_ORIENTATIONS];
            for row in rows {
                for &code in &row[x - 1..=x + 1] {
                    if code < INVALID_QUANTIZATION {
                        votes[code as usize] += 1;
                    }
                }
            }

            let mut best_bucket = 0usize;
            for bucket in 1..NUM_ORIENTATIONS {
                if votes[bucket] > votes[best_bucket] {
                    best_bucket = bucket;
                }
            }
            if votes[best_bucket] >= MIN_VOTES {
                out_row[x] = 1 << best_bucket;
            }
        }
    }
    Ok(out)
}

/// ORs orientation masks over an `n x n` window.
///
/// Output pixel `(x, y)` gathers inputs over `[x, x+n-1] x [y, y+n-1]`,
/// clipped at the borders; equivalently, every set input bit lands in the
/// `n x n` block of output pixels at and before it. A feature looked up at
/// any grid-snapped position covering the true pixel therefore still
/// responds. `n <= 1` is the identity.
pub fn spread(masks: ImageView<'_, u8>, neighborhood: usize) -> OriMatchResult<OwnedImage<u8>> {
    let width = masks.width();
    let height = masks.height();
    let mut out = OwnedImage::filled(0u8, width, height)?;
    let buf = out.as_mut_slice();

    let n = neighborhood.max(1).min(width).min(height);
    for dy in 0..n {
        for dx in 0..n {
            for y in 0..height - dy {
                let src_row = masks.row(y + dy).expect("row in range");
                let out_row = &mut buf[y * width..y * width + width - dx];
                for (dst, &src) in out_row.iter_mut().zip(&src_row[dx..]) {
                    *dst |= src;
                }
            }
        }
    }
    Ok(out)
}

/// Full feature-map pass: quantize, majority-vote, then spread.
///
/// `spread_neighborhood <= 1` skips the spreading step, which is the mode
/// used during template authoring.
pub fn compute(
    orientations: ImageView<'_, i32>,
    spread_neighborhood: usize,
) -> OriMatchResult<OwnedImage<u8>> {
    let codes = quantize(orientations)?;
    let voted = majority_vote(codes.view())?;
    if spread_neighborhood <= 1 {
        return Ok(voted);
    }
    spread(voted.view(), spread_neighborhood)
}
