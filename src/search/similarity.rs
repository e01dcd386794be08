//! Similarity accumulation over a search window.
//!
//! One accumulator cell covers a `t x t` block of candidate positions. Each
//! template feature contributes by adding its precomputed response slab into
//! a `u8` staging buffer; the staging buffer drains into the `i16`
//! accumulator every `255 / MAX_FEATURE_SIMILARITY` features, before a byte
//! could wrap. A perfect alignment therefore accumulates exactly
//! `feature_count * MAX_FEATURE_SIMILARITY`.

use crate::kernel;
use crate::linear::{LinearizedMaps, MAX_FEATURE_SIMILARITY};
use crate::template::Template;
use crate::util::Rect;

/// Features the staging buffer can absorb before a flush is forced.
const FEATURES_PER_FLUSH: usize = 255 / MAX_FEATURE_SIMILARITY as usize;

/// Accumulated similarity scores for a rectangle of candidate positions.
pub(crate) struct SimilarityGrid {
    origin_x: i32,
    origin_y: i32,
    cell: usize,
    width: usize,
    height: usize,
    scores: Vec<i16>,
}

impl SimilarityGrid {
    /// Number of accumulator cells.
    pub(crate) fn len(&self) -> usize {
        self.scores.len()
    }

    /// Raw score of cell `idx`.
    pub(crate) fn raw(&self, idx: usize) -> i16 {
        self.scores[idx]
    }

    /// Full-resolution candidate position represented by cell `idx`.
    pub(crate) fn position(&self, idx: usize) -> (i32, i32) {
        let cx = (idx % self.width) as i32;
        let cy = (idx / self.width) as i32;
        let t = self.cell as i32;
        (self.origin_x + cx * t + t / 2, self.origin_y + cy * t + t / 2)
    }

    #[cfg(test)]
    pub(crate) fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// Accumulates all template features over `search`, a rectangle of
/// candidate top-left positions in level pixel coordinates.
///
/// Features whose slab falls outside the subsampled response grid simply
/// contribute nothing; cells past a slab's clamped span stay untouched,
/// mirroring the zero padding of the underlying maps.
pub(crate) fn similarity_search(
    maps: &LinearizedMaps,
    template: &Template,
    search: Rect,
) -> SimilarityGrid {
    let t = maps.neighborhood();
    let acc_width = (search.width as usize).div_ceil(t);
    let acc_height = (search.height as usize).div_ceil(t);
    let cells = acc_width * acc_height;

    let mut scores = vec![0i16; cells];
    let mut staging = vec![0u8; cells];
    let mut staged_features = 0usize;

    for feature in &template.features {
        let px = search.x + feature.x;
        let py = search.y + feature.y;
        if px < 0 || py < 0 {
            continue;
        }
        let Some((slab, base)) = maps.response_at(feature.label(), px as usize, py as usize)
        else {
            continue;
        };

        let mem_width = maps.mem_width();
        let mem_height = maps.mem_height();
        let (mx, my) = (px as usize / t, py as usize / t);
        let span_w = acc_width.min(mem_width - mx);
        let span_h = acc_height.min(mem_height - my);
        for row in 0..span_h {
            let src_start = base + row * mem_width;
            let dst_start = row * acc_width;
            kernel::accumulate_bytes(
                &mut staging[dst_start..dst_start + span_w],
                &slab[src_start..src_start + span_w],
            );
        }

        staged_features += 1;
        if staged_features == FEATURES_PER_FLUSH {
            kernel::flush_staging(&mut scores, &mut staging);
            staged_features = 0;
        }
    }

    if staged_features > 0 {
        kernel::flush_staging(&mut scores, &mut staging);
    }

    SimilarityGrid {
        origin_x: search.x,
        origin_y: search.y,
        cell: t,
        width: acc_width,
        height: acc_height,
        scores,
    }
}
