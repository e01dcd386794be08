//! Sparse orientation templates and per-resolution pyramids.
//!
//! A template is a spatially decorrelated set of feature points (position +
//! one-hot quantized orientation) relative to its tight bounding box.
//! Templates are built once at registration time and are immutable and
//! freely shared afterwards; a pyramid re-extracts features independently at
//! every downsampled resolution rather than subsampling level 0.

use crate::featuremap;
use crate::gradient;
use crate::image::SourceImage;
use crate::search::DetectorConfig;
use crate::util::{OriMatchError, OriMatchResult, Rect};

pub mod xml;

/// A sparse sample point relative to the template origin.
///
/// `angle_bits` always holds exactly one set bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Feature {
    pub x: i32,
    pub y: i32,
    pub angle_bits: u8,
}

impl Feature {
    /// Creates a feature from a quantized orientation bucket index.
    ///
    /// Returns `None` when `label` is not a valid bucket.
    pub fn from_label(x: i32, y: i32, label: u8) -> Option<Self> {
        if usize::from(label) >= featuremap::NUM_ORIENTATIONS {
            return None;
        }
        Some(Self {
            x,
            y,
            angle_bits: 1 << label,
        })
    }

    /// Quantized orientation bucket index of this feature.
    pub fn label(&self) -> u8 {
        self.angle_bits.trailing_zeros() as u8
    }
}

/// Immutable feature template for one pyramid level of one class.
#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    pub class_label: String,
    pub pyramid_level: usize,
    pub width: i32,
    pub height: i32,
    pub features: Vec<Feature>,
    /// Opaque extension payload carried through serialization untouched.
    pub additional_data: Option<String>,
}

impl Template {
    /// Bounding rectangle of this template anchored at `(x, y)`.
    pub fn bounding_rect_at(&self, x: i32, y: i32) -> Rect {
        Rect::new(x, y, self.width, self.height)
    }
}

/// Ordered templates for one class: index 0 is full resolution, each next
/// level was extracted from a 2x-downsampled source.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplatePyramid {
    levels: Vec<Template>,
}

impl TemplatePyramid {
    /// Builds a pyramid by re-extracting features at every level.
    ///
    /// Fails with [`OriMatchError::EmptyTemplate`] when any level yields no
    /// feature candidates; the caller rejects the whole class in that case.
    pub fn build(
        source: &SourceImage,
        class_label: &str,
        cfg: &DetectorConfig,
    ) -> OriMatchResult<Self> {
        let num_levels = cfg.num_levels();
        let mut levels = Vec::with_capacity(num_levels);
        let mut owned: Option<SourceImage> = None;

        for level in 0..num_levels {
            let src = owned.as_ref().unwrap_or(source);
            let template = extract_level(src, class_label, level, cfg)?.ok_or_else(|| {
                OriMatchError::EmptyTemplate {
                    class: class_label.to_owned(),
                    level,
                }
            })?;
            levels.push(template);

            if level + 1 < num_levels {
                owned = Some(src.downsample()?);
            }
        }

        Self::from_levels(levels)
    }

    /// Wraps pre-built levels, enforcing the shared-label invariant.
    pub fn from_levels(levels: Vec<Template>) -> OriMatchResult<Self> {
        if levels.is_empty() {
            return Err(OriMatchError::InvalidConfig {
                reason: "template pyramid needs at least one level",
            });
        }
        let label = &levels[0].class_label;
        if levels.iter().any(|t| &t.class_label != label) {
            return Err(OriMatchError::InvalidConfig {
                reason: "all pyramid levels must share one class label",
            });
        }
        if levels.iter().any(|t| t.features.is_empty()) {
            return Err(OriMatchError::EmptyTemplate {
                class: label.clone(),
                level: levels.iter().position(|t| t.features.is_empty()).unwrap_or(0),
            });
        }
        Ok(Self { levels })
    }

    /// All levels, finest first.
    pub fn levels(&self) -> &[Template] {
        &self.levels
    }

    /// Template at one pyramid level.
    pub fn level(&self, index: usize) -> Option<&Template> {
        self.levels.get(index)
    }

    /// Class label shared by every level.
    pub fn class_label(&self) -> &str {
        &self.levels[0].class_label
    }
}

/// Extracts one template level, or `None` when no candidates survive.
fn extract_level(
    source: &SourceImage,
    class_label: &str,
    level: usize,
    cfg: &DetectorConfig,
) -> OriMatchResult<Option<Template>> {
    let orientations = gradient::source_orientations(source, cfg.min_magnitude)?;
    // No spreading during template authoring: features keep exact positions.
    let masks = featuremap::compute(orientations.view(), 0)?;

    let view = masks.view();
    let mut candidates = Vec::new();
    for y in 0..view.height() {
        let row = view.row(y).expect("row in range");
        for (x, &bits) in row.iter().enumerate() {
            if bits != 0 {
                candidates.push(Feature {
                    x: x as i32,
                    y: y as i32,
                    angle_bits: bits,
                });
            }
        }
    }
    if candidates.is_empty() {
        return Ok(None);
    }

    let max_features = cfg.max_features_per_level[level];
    let selected = select_scattered(
        &candidates,
        max_features,
        cfg.initial_feature_distance,
    );

    Ok(Some(crop_to_bounding_box(
        selected,
        class_label.to_owned(),
        level,
    )))
}

/// Greedy farthest-point-style selection.
///
/// Scans the candidate list in order, accepting a candidate only when its
/// squared distance to every already-accepted feature exceeds `distance^2`.
/// Each full scan that leaves the quota unfilled relaxes `distance` by one;
/// at distance 0 any remaining distinct candidate is accepted, so the loop
/// terminates with `min(candidates, max_features)` accepted.
fn select_scattered(candidates: &[Feature], max_features: usize, initial_distance: i32) -> Vec<Feature> {
    let mut accepted: Vec<Feature> = Vec::with_capacity(max_features.min(candidates.len()));
    let mut taken = vec![false; candidates.len()];
    let mut distance = initial_distance.max(0);

    loop {
        let dist_sq = i64::from(distance) * i64::from(distance);
        for (idx, cand) in candidates.iter().enumerate() {
            if accepted.len() >= max_features {
                break;
            }
            if taken[idx] {
                continue;
            }
            let far_enough = accepted.iter().all(|f| {
                let dx = i64::from(f.x - cand.x);
                let dy = i64::from(f.y - cand.y);
                dx * dx + dy * dy > dist_sq
            });
            if far_enough {
                taken[idx] = true;
                accepted.push(*cand);
            }
        }

        if accepted.len() >= max_features || distance == 0 {
            return accepted;
        }
        distance -= 1;
    }
}

/// Translates features to their tight bounding box and records its size.
fn crop_to_bounding_box(mut features: Vec<Feature>, class_label: String, level: usize) -> Template {
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    for f in &features {
        min_x = min_x.min(f.x);
        min_y = min_y.min(f.y);
        max_x = max_x.max(f.x);
        max_y = max_y.max(f.y);
    }

    for f in &mut features {
        f.x = (f.x - min_x).max(0);
        f.y = (f.y - min_y).max(0);
    }

    Template {
        class_label,
        pyramid_level: level,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
        features,
        additional_data: None,
    }
}
