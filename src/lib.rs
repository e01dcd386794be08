//! OriMatch is a LINE2D-style fast template matching library.
//!
//! Templates are sparse sets of quantized gradient orientations extracted
//! once per object class over an image pyramid. A query image is reduced to
//! per-orientation linearized response maps, so matching a template over a
//! search window is a handful of contiguous byte-slab additions; candidates
//! found at the coarsest pyramid level are refined level by level down to
//! full resolution, and near-duplicate detections are clustered into
//! representative group matches.
//!
//! Optional features: `rayon` for parallel matching and extraction, `simd`
//! for the `wide` accumulation kernel, `tracing` for instrumentation and
//! `image-io` for loading sources from disk.

pub mod featuremap;
pub mod gradient;
pub mod group;
pub mod image;
mod kernel;
pub mod linear;
pub mod search;
pub mod template;
mod trace;
pub mod util;

pub use gradient::INVALID_ORIENTATION;
pub use group::{group_rectangles, GroupMatch};
pub use image::{BgrView, ImageView, OwnedBgrImage, OwnedImage, SourceImage};
pub use linear::{
    LinearizedMapPyramid, LinearizedMaps, MAX_FEATURE_SIMILARITY, MAX_TEMPLATE_FEATURES,
};
pub use search::{CancelToken, Detector, DetectorConfig, Match, MatchHandle, TemplateClass};
pub use template::{Feature, Template, TemplatePyramid};
pub use util::{OriMatchError, OriMatchResult, Rect};

#[cfg(feature = "image-io")]
pub use image::io;
