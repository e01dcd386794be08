//! Linearized orientation response maps.
//!
//! For a query image, the matcher never compares orientations directly.
//! Each pyramid level precomputes, per orientation label and per offset in a
//! `t x t` grid, a response slab holding the similarity of that label against
//! the spread orientation mask at every `t`-strided pixel. Accumulating one
//! template feature over a whole search window then becomes a single
//! contiguous byte-slab addition instead of a per-position lookup.
//!
//! Maps are query-scoped: built once per image per level, discarded after
//! the detection pass. They own no template data.

use crate::featuremap::{self, NUM_ORIENTATIONS};
use crate::gradient;
use crate::image::{ImageView, SourceImage};
use crate::search::{CancelToken, DetectorConfig};
use crate::trace::trace_span;
use crate::util::OriMatchResult;

/// Highest similarity a single feature can contribute.
pub const MAX_FEATURE_SIMILARITY: u8 = 4;

/// Similarity granted to orientations one bucket apart.
const ADJACENT_SIMILARITY: u8 = 3;

/// Feature-count ceiling keeping a perfect raw score inside an `i16`.
pub const MAX_TEMPLATE_FEATURES: usize = i16::MAX as usize / MAX_FEATURE_SIMILARITY as usize;

/// Response of each orientation label against every possible spread mask:
/// the best score over the mask's set bits, by circular bucket distance
/// (exact hit scores 4, adjacent bucket 3, anything farther 0).
static SIMILARITY_LUT: [[u8; 256]; NUM_ORIENTATIONS] = build_similarity_lut();

const fn circular_bucket_distance(a: usize, b: usize) -> usize {
    let d = if a > b { a - b } else { b - a };
    if d > NUM_ORIENTATIONS / 2 {
        NUM_ORIENTATIONS - d
    } else {
        d
    }
}

const fn build_similarity_lut() -> [[u8; 256]; NUM_ORIENTATIONS] {
    let mut lut = [[0u8; 256]; NUM_ORIENTATIONS];
    let mut label = 0usize;
    while label < NUM_ORIENTATIONS {
        let mut mask = 0usize;
        while mask < 256 {
            let mut best = 0u8;
            let mut bit = 0usize;
            while bit < NUM_ORIENTATIONS {
                if mask & (1 << bit) != 0 {
                    let score = match circular_bucket_distance(label, bit) {
                        0 => MAX_FEATURE_SIMILARITY,
                        1 => ADJACENT_SIMILARITY,
                        _ => 0,
                    };
                    if score > best {
                        best = score;
                    }
                }
                bit += 1;
            }
            lut[label][mask] = best;
            mask += 1;
        }
        label += 1;
    }
    lut
}

/// Per-level linearized response tables for one query image.
pub struct LinearizedMaps {
    neighborhood: usize,
    width: usize,
    height: usize,
    mem_width: usize,
    mem_height: usize,
    data: Vec<u8>,
}

impl LinearizedMaps {
    /// Builds response slabs from a spread orientation-mask image.
    ///
    /// `neighborhood` is the spread/stride granularity `t`; slabs cover the
    /// `floor(size / t)` grid, leftover border columns and rows contribute
    /// nothing.
    pub fn build(spread_masks: ImageView<'_, u8>, neighborhood: usize) -> OriMatchResult<Self> {
        let t = neighborhood.max(1);
        let width = spread_masks.width();
        let height = spread_masks.height();
        let mem_width = width / t;
        let mem_height = height / t;
        let mem_size = mem_width * mem_height;

        let mut data = Vec::with_capacity(NUM_ORIENTATIONS * t * t * mem_size);
        for label in 0..NUM_ORIENTATIONS {
            let lut_row = &SIMILARITY_LUT[label];
            for off_y in 0..t {
                for off_x in 0..t {
                    for my in 0..mem_height {
                        let row = spread_masks.row(off_y + my * t).expect("row in range");
                        for mx in 0..mem_width {
                            data.push(lut_row[usize::from(row[off_x + mx * t])]);
                        }
                    }
                }
            }
        }

        Ok(Self {
            neighborhood: t,
            width,
            height,
            mem_width,
            mem_height,
            data,
        })
    }

    /// Stride granularity the maps were built with.
    pub fn neighborhood(&self) -> usize {
        self.neighborhood
    }

    /// Width of the underlying level image.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the underlying level image.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Width of the subsampled response grid.
    pub fn mem_width(&self) -> usize {
        self.mem_width
    }

    /// Height of the subsampled response grid.
    pub fn mem_height(&self) -> usize {
        self.mem_height
    }

    /// Response slab for one label and grid offset, `mem_width`-strided.
    pub(crate) fn slab(&self, label: u8, off_y: usize, off_x: usize) -> &[u8] {
        let t = self.neighborhood;
        let mem_size = self.mem_width * self.mem_height;
        let idx = (usize::from(label) * t * t + off_y * t + off_x) * mem_size;
        &self.data[idx..idx + mem_size]
    }

    /// Slab and base element index for a feature landing on pixel `(px, py)`.
    ///
    /// Returns `None` when the pixel falls outside the subsampled grid.
    pub(crate) fn response_at(&self, label: u8, px: usize, py: usize) -> Option<(&[u8], usize)> {
        if px >= self.width || py >= self.height {
            return None;
        }
        let t = self.neighborhood;
        let (mx, my) = (px / t, py / t);
        if mx >= self.mem_width || my >= self.mem_height {
            return None;
        }
        Some((self.slab(label, py % t, px % t), my * self.mem_width + mx))
    }
}

/// Linearized maps for every pyramid level of one query image.
///
/// Rebuilt per frame; levels align one-to-one with the configured
/// neighborhood array (finest first).
pub struct LinearizedMapPyramid {
    levels: Vec<LinearizedMaps>,
}

impl LinearizedMapPyramid {
    /// Extracts orientations, spreads them and linearizes every level.
    ///
    /// The cancellation token is checked once per pyramid level.
    pub fn build(
        source: &SourceImage,
        cfg: &DetectorConfig,
        token: &CancelToken,
    ) -> OriMatchResult<Self> {
        let num_levels = cfg.num_levels();
        let _span = trace_span!("linearize_query", levels = num_levels).entered();

        let mut levels = Vec::with_capacity(num_levels);
        let mut owned: Option<SourceImage> = None;
        for level in 0..num_levels {
            token.checkpoint()?;
            let src = owned.as_ref().unwrap_or(source);
            let neighborhood = cfg.neighborhood_per_level[level];

            let orientations = gradient::source_orientations(src, cfg.min_magnitude)?;
            let masks = featuremap::compute(orientations.view(), neighborhood)?;
            levels.push(LinearizedMaps::build(masks.view(), neighborhood)?);

            if level + 1 < num_levels {
                owned = Some(src.downsample()?);
            }
        }
        Ok(Self { levels })
    }

    /// All levels, finest first.
    pub fn levels(&self) -> &[LinearizedMaps] {
        &self.levels
    }
}
