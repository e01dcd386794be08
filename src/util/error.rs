//! Error types for orimatch.

use thiserror::Error;

/// Result alias for orimatch operations.
pub type OriMatchResult<T> = std::result::Result<T, OriMatchError>;

/// Errors that can occur when building templates or running a detection pass.
#[derive(Debug, Error, PartialEq)]
pub enum OriMatchError {
    /// An image dimension is zero or overflows addressing arithmetic.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The row stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// The backing buffer is too small for the declared geometry.
    #[error("buffer too small: needed {needed}, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Detector configuration failed validation.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },
    /// A template pyramid level produced no features during extraction.
    #[error("class {class:?}: no features extracted at pyramid level {level}")]
    EmptyTemplate { class: String, level: usize },
    /// Matching failed for one template class; the whole batch is rejected.
    #[error("matching failed for class {class:?}: {source}")]
    ClassMatch {
        class: String,
        #[source]
        source: Box<OriMatchError>,
    },
    /// A detection pass was cancelled through its `CancelToken`.
    #[error("detection cancelled")]
    Cancelled,
    /// The persisted template document is not well-formed.
    #[error("template xml: {reason}")]
    Xml { reason: String },
    /// A required attribute is absent from a persisted element.
    #[error("template xml: element <{element}> is missing attribute {attribute:?}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    /// An attribute is present but does not parse to the expected type.
    #[error("template xml: element <{element}> has malformed attribute {attribute:?}")]
    MalformedAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    /// Reading or writing a template file failed.
    #[error("io: {reason}")]
    Io { reason: String },
    /// Image decoding or file access failed.
    #[cfg(feature = "image-io")]
    #[error("image io: {reason}")]
    ImageIo { reason: String },
}
