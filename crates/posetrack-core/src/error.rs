//! Error types for posetrack-rs.

use thiserror::Error;

/// The main error type for posetrack-rs operations.
#[derive(Error, Debug)]
pub enum PoseTrackError {
    /// No scene object is selected.
    #[error("no scene object selected")]
    NoSelection,

    /// The selected object has no keyframes.
    #[error("the selected object has no keyframes")]
    EmptyTrack,

    /// The document is neither a camera array nor an object with a `poses` array.
    #[error("unsupported document: expected a camera array or an object with a poses array")]
    UnsupportedDocument,

    /// A record's position is missing or does not have three components.
    #[error("camera {index}: position must be a 3-element array (got {len} elements)")]
    InvalidPosition { index: usize, len: usize },

    /// A record's rotation is neither a 3x3 matrix nor a flat 9-element array.
    #[error("camera {index}: rotation must be 3x3 or a flat 9-element array (got {len} elements)")]
    InvalidRotation { index: usize, len: usize },

    /// Image loading was requested before any frame had an expected image name.
    #[error("no frame has an associated image name; load cameras first")]
    NoImageNames,

    /// No candidate path resolved to an image file.
    #[error("image '{0}' not found")]
    ImageNotFound(String),

    /// An image file exists but could not be decoded.
    #[error("image decode error: {0}")]
    ImageDecode(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for posetrack-rs operations.
pub type Result<T> = std::result::Result<T, PoseTrackError>;
