//! Coarse-to-fine template detection.
//!
//! The detector owns the registered template classes (an arena indexed by
//! [`MatchHandle`]) and runs the pyramidal search: an exhaustive pass over
//! the coarsest linearized maps, then per-candidate local refinement level by
//! level down to full resolution. Templates are immutable once registered,
//! so concurrent detection passes share them freely; every mutable buffer is
//! owned by a single pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::group::{self, GroupMatch};
use crate::image::SourceImage;
use crate::linear::{
    LinearizedMapPyramid, LinearizedMaps, MAX_FEATURE_SIMILARITY, MAX_TEMPLATE_FEATURES,
};
use crate::template::{Template, TemplatePyramid};
use crate::trace::{trace_event, trace_span};
use crate::util::{OriMatchError, OriMatchResult, Rect};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

pub(crate) mod similarity;

use similarity::similarity_search;

/// Runtime tuning for template extraction and matching.
///
/// The per-level arrays run finest (index 0) to coarsest; their shared
/// length fixes the pyramid depth.
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    /// Spread window and accumulator granularity per pyramid level.
    pub neighborhood_per_level: Vec<usize>,
    /// Feature quota per pyramid level during template extraction.
    pub max_features_per_level: Vec<usize>,
    /// Minimum gradient magnitude for a pixel to carry an orientation.
    pub min_magnitude: i32,
    /// Starting pairwise distance of the greedy feature selection.
    pub initial_feature_distance: i32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            neighborhood_per_level: vec![5, 8],
            max_features_per_level: vec![128, 64],
            min_magnitude: 30,
            initial_feature_distance: 50,
        }
    }
}

impl DetectorConfig {
    /// Number of pyramid levels the config describes.
    pub fn num_levels(&self) -> usize {
        self.neighborhood_per_level.len()
    }

    pub(crate) fn validate(&self) -> OriMatchResult<()> {
        if self.neighborhood_per_level.is_empty() {
            return Err(OriMatchError::InvalidConfig {
                reason: "at least one pyramid level is required",
            });
        }
        if self.neighborhood_per_level.len() != self.max_features_per_level.len() {
            return Err(OriMatchError::InvalidConfig {
                reason: "per-level arrays must have equal lengths",
            });
        }
        if self.neighborhood_per_level.iter().any(|&n| n == 0) {
            return Err(OriMatchError::InvalidConfig {
                reason: "neighborhood sizes must be at least 1",
            });
        }
        if self
            .max_features_per_level
            .iter()
            .any(|&n| n == 0 || n > MAX_TEMPLATE_FEATURES)
        {
            return Err(OriMatchError::InvalidConfig {
                reason: "per-level feature quotas must be in 1..=32767/4",
            });
        }
        if self.min_magnitude < 0 || self.initial_feature_distance < 0 {
            return Err(OriMatchError::InvalidConfig {
                reason: "thresholds must be non-negative",
            });
        }
        Ok(())
    }
}

/// Cooperative cancellation flag for long detection passes.
///
/// Checked between pyramid levels while maps are built and between template
/// pyramids while matching; a cancelled pass surfaces as
/// [`OriMatchError::Cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; observed at the next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn checkpoint(&self) -> OriMatchResult<()> {
        if self.is_cancelled() {
            return Err(OriMatchError::Cancelled);
        }
        Ok(())
    }
}

/// Index of a template pyramid inside the detector's class arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MatchHandle {
    pub class: usize,
    pub pyramid: usize,
}

/// A raw detection: template anchor position and percentage score.
#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    /// Top-left corner of the matched template bounding box, level 0 scale.
    pub x: i32,
    pub y: i32,
    /// Feature agreement rescaled to `0..=100`.
    pub score: f32,
    /// Back-reference into the detector's template arena.
    pub handle: MatchHandle,
}

/// One registered object class: a label plus its template pyramids.
pub struct TemplateClass {
    label: String,
    pyramids: Vec<TemplatePyramid>,
}

impl TemplateClass {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pyramids(&self) -> &[TemplatePyramid] {
        &self.pyramids
    }
}

/// Gradient-orientation template detector.
pub struct Detector {
    cfg: DetectorConfig,
    classes: Vec<TemplateClass>,
}

impl Detector {
    /// Creates a detector after validating the configuration.
    pub fn new(cfg: DetectorConfig) -> OriMatchResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            classes: Vec::new(),
        })
    }

    /// Detector with the default configuration.
    pub fn with_default_config() -> Self {
        Self {
            cfg: DetectorConfig::default(),
            classes: Vec::new(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }

    pub fn classes(&self) -> &[TemplateClass] {
        &self.classes
    }

    /// Builds template pyramids from source images and registers the class.
    ///
    /// All sources must produce valid pyramids; otherwise the class is
    /// rejected as a whole and previously registered classes are untouched.
    /// Returns the class index.
    pub fn add_class(&mut self, label: &str, sources: &[SourceImage]) -> OriMatchResult<usize> {
        let _span = trace_span!("add_class", sources = sources.len()).entered();
        let mut pyramids = Vec::with_capacity(sources.len());
        for source in sources {
            pyramids.push(TemplatePyramid::build(source, label, &self.cfg)?);
        }
        self.insert_class(label, pyramids)
    }

    /// Registers pre-built pyramids (e.g. deserialized ones) under a label.
    pub fn add_pyramids(
        &mut self,
        label: &str,
        pyramids: Vec<TemplatePyramid>,
    ) -> OriMatchResult<usize> {
        for pyramid in &pyramids {
            if pyramid.class_label() != label {
                return Err(OriMatchError::InvalidConfig {
                    reason: "pyramid class label does not match the class being registered",
                });
            }
            if pyramid.levels().len() != self.cfg.num_levels() {
                return Err(OriMatchError::InvalidConfig {
                    reason: "pyramid level count does not match the detector config",
                });
            }
            if pyramid
                .levels()
                .iter()
                .any(|t| t.features.len() > MAX_TEMPLATE_FEATURES)
            {
                return Err(OriMatchError::InvalidConfig {
                    reason: "template exceeds the feature-count ceiling",
                });
            }
        }
        self.insert_class(label, pyramids)
    }

    fn insert_class(
        &mut self,
        label: &str,
        pyramids: Vec<TemplatePyramid>,
    ) -> OriMatchResult<usize> {
        if pyramids.is_empty() {
            return Err(OriMatchError::InvalidConfig {
                reason: "a class needs at least one template pyramid",
            });
        }
        if let Some(idx) = self.classes.iter().position(|c| c.label == label) {
            self.classes[idx].pyramids.extend(pyramids);
            return Ok(idx);
        }
        self.classes.push(TemplateClass {
            label: label.to_owned(),
            pyramids,
        });
        Ok(self.classes.len() - 1)
    }

    /// Level-0 template referenced by a handle.
    pub fn template(&self, handle: MatchHandle) -> Option<&Template> {
        self.classes
            .get(handle.class)
            .and_then(|c| c.pyramids.get(handle.pyramid))
            .and_then(|p| p.level(0))
    }

    /// Full-resolution bounding rectangle of a match.
    pub fn bounding_rect(&self, m: &Match) -> Rect {
        match self.template(m.handle) {
            Some(t) => t.bounding_rect_at(m.x, m.y),
            None => Rect::new(m.x, m.y, 0, 0),
        }
    }

    /// Runs detection over all registered classes.
    ///
    /// Always returns a (possibly empty) list; degenerate inputs such as
    /// templates larger than the searchable region contribute no matches.
    pub fn detect(&self, source: &SourceImage, min_match_pct: f32) -> OriMatchResult<Vec<Match>> {
        self.detect_with_cancel(source, min_match_pct, &CancelToken::new())
    }

    /// Detection with a cooperative cancellation token.
    ///
    /// Under the `rayon` feature, template pyramids are matched by parallel
    /// workers into per-task buffers merged after all tasks finish; a failed
    /// class fails the whole batch wrapped in
    /// [`OriMatchError::ClassMatch`].
    pub fn detect_with_cancel(
        &self,
        source: &SourceImage,
        min_match_pct: f32,
        token: &CancelToken,
    ) -> OriMatchResult<Vec<Match>> {
        let _span = trace_span!("detect", classes = self.classes.len()).entered();
        let maps = LinearizedMapPyramid::build(source, &self.cfg, token)?;

        let tasks: Vec<MatchHandle> = self
            .classes
            .iter()
            .enumerate()
            .flat_map(|(class, c)| {
                (0..c.pyramids.len()).map(move |pyramid| MatchHandle { class, pyramid })
            })
            .collect();

        let run = |handle: &MatchHandle| -> OriMatchResult<Vec<Match>> {
            token.checkpoint()?;
            let class = &self.classes[handle.class];
            let pyramid = &class.pyramids[handle.pyramid];
            match_template_pyramid(&maps, pyramid, &self.cfg, min_match_pct, *handle).map_err(
                |source| match source {
                    OriMatchError::Cancelled => OriMatchError::Cancelled,
                    other => OriMatchError::ClassMatch {
                        class: class.label.clone(),
                        source: Box::new(other),
                    },
                },
            )
        };

        #[cfg(feature = "rayon")]
        let results: Vec<OriMatchResult<Vec<Match>>> = tasks.par_iter().map(run).collect();

        #[cfg(not(feature = "rayon"))]
        let results: Vec<OriMatchResult<Vec<Match>>> = tasks.iter().map(run).collect();

        let mut matches = Vec::new();
        let mut failure = None;
        for result in results {
            match result {
                Ok(found) => matches.extend(found),
                Err(OriMatchError::Cancelled) => return Err(OriMatchError::Cancelled),
                Err(err) if failure.is_none() => failure = Some(err),
                Err(_) => {}
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        trace_event!("detections", count = matches.len());
        Ok(matches)
    }

    /// Clusters near-duplicate detections into representative group matches.
    ///
    /// Nearness is judged on template bounding rectangles; groups smaller
    /// than `min_neighbors` are dropped (when `min_neighbors > 0`).
    pub fn group_matches(
        &self,
        matches: &[Match],
        threshold: f32,
        min_neighbors: usize,
    ) -> Vec<GroupMatch<Match>> {
        group::group_by(
            matches,
            min_neighbors,
            |a, b| {
                group::near_rectangles(&self.bounding_rect(a), &self.bounding_rect(b), threshold)
            },
            average_match,
        )
    }
}

/// Representative of a group of matches: ceil-mean position, mean score,
/// the handle of the strongest member.
fn average_match(members: &[Match]) -> Match {
    let count = members.len() as f64;
    let sum_x: i64 = members.iter().map(|m| i64::from(m.x)).sum();
    let sum_y: i64 = members.iter().map(|m| i64::from(m.y)).sum();
    let mean_score = members.iter().map(|m| f64::from(m.score)).sum::<f64>() / count;
    let best = members
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .expect("groups are never empty");

    Match {
        x: (sum_x as f64 / count).ceil() as i32,
        y: (sum_y as f64 / count).ceil() as i32,
        score: mean_score as f32,
        handle: best.handle,
    }
}

#[derive(Copy, Clone, Debug)]
struct Candidate {
    x: i32,
    y: i32,
    raw: i16,
}

/// Percentage threshold converted to a raw accumulator score.
fn raw_threshold(min_match_pct: f32, feature_count: usize) -> i16 {
    let raw = (min_match_pct * f32::from(MAX_FEATURE_SIMILARITY) * feature_count as f32 / 100.0)
        .ceil()
        .clamp(0.0, f32::from(i16::MAX));
    raw as i16
}

/// Raw accumulator score rescaled to a percentage.
fn raw_to_pct(raw: i16, feature_count: usize) -> f32 {
    f32::from(raw) * 100.0 / (f32::from(MAX_FEATURE_SIMILARITY) * feature_count as f32)
}

/// Exhaustive scan of one level's full searchable region.
fn match_level_exhaustive(maps: &LinearizedMaps, template: &Template, threshold: i16) -> Vec<Candidate> {
    let (img_w, img_h) = (maps.width() as i32, maps.height() as i32);
    if template.width > img_w || template.height > img_h {
        return Vec::new();
    }

    let search = Rect::new(0, 0, img_w - template.width + 1, img_h - template.height + 1);
    let grid = similarity_search(maps, template, search);

    let mut out = Vec::new();
    for idx in 0..grid.len() {
        let raw = grid.raw(idx);
        if raw >= threshold {
            let (x, y) = grid.position(idx);
            out.push(Candidate { x, y, raw });
        }
    }
    out
}

/// Local refinement of one coarse candidate at the next finer level.
///
/// The candidate's coordinates are doubled (with the +1 pyramid alignment
/// offset) and only a window around that point is rescored; the best
/// in-window cell survives when it still clears the threshold.
fn refine_candidate(
    maps: &LinearizedMaps,
    template: &Template,
    coarse: Candidate,
    window: i32,
    threshold: i16,
) -> Option<Candidate> {
    let (img_w, img_h) = (maps.width() as i32, maps.height() as i32);
    if template.width > img_w || template.height > img_h {
        return None;
    }

    let x = coarse.x * 2 + 1;
    let y = coarse.y * 2 + 1;
    let valid = Rect::new(0, 0, img_w - template.width + 1, img_h - template.height + 1);
    // Half-extent window/2 plus one cell of slack so grid-snapped coarse
    // positions always cover the true anchor after doubling.
    let half = window / 2 + 1;
    let wanted = Rect::new(x - half, y - half, window + 2, window + 2);
    let search = wanted.intersect(&valid)?;

    let grid = similarity_search(maps, template, search);
    let mut best: Option<(usize, i16)> = None;
    for idx in 0..grid.len() {
        let raw = grid.raw(idx);
        if raw >= threshold && best.map_or(true, |(_, b)| raw > b) {
            best = Some((idx, raw));
        }
    }

    best.map(|(idx, raw)| {
        let (bx, by) = grid.position(idx);
        Candidate { x: bx, y: by, raw }
    })
}

/// Coarse-to-fine match of one template pyramid against prebuilt maps.
fn match_template_pyramid(
    maps: &LinearizedMapPyramid,
    pyramid: &TemplatePyramid,
    cfg: &DetectorConfig,
    min_match_pct: f32,
    handle: MatchHandle,
) -> OriMatchResult<Vec<Match>> {
    let levels = maps.levels();
    if pyramid.levels().len() != levels.len() {
        return Err(OriMatchError::InvalidConfig {
            reason: "template pyramid depth does not match the query maps",
        });
    }

    let coarsest = levels.len() - 1;
    let template = pyramid.level(coarsest).expect("level exists");
    let threshold = raw_threshold(min_match_pct, template.features.len());
    let _span = trace_span!("match_pyramid", level = coarsest).entered();

    let mut candidates = match_level_exhaustive(&levels[coarsest], template, threshold);
    // Partial objects hanging over the right image edge are culled at the
    // coarsest level only; finer levels inherit the surviving set.
    candidates.retain(|c| c.x + template.width <= levels[coarsest].width() as i32);

    for level in (0..coarsest).rev() {
        let template = pyramid.level(level).expect("level exists");
        let threshold = raw_threshold(min_match_pct, template.features.len());
        let window = 2 * cfg.neighborhood_per_level[level + 1] as i32;

        candidates = candidates
            .into_iter()
            .filter_map(|c| refine_candidate(&levels[level], template, c, window, threshold))
            .collect();
        if candidates.is_empty() {
            break;
        }
    }

    let feature_count = pyramid.level(0).expect("level exists").features.len();
    Ok(candidates
        .into_iter()
        .map(|c| Match {
            x: c.x,
            y: c.y,
            score: raw_to_pct(c.raw, feature_count),
            handle,
        })
        .collect())
}
