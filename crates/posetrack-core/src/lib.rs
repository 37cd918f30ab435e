//! Core logic for posetrack-rs.
//!
//! This crate holds everything that does not need a live host:
//! - [`KeyframeStore`] and [`Keyframe`] for per-object pose tracks
//! - [`CubicSpline`] for periodic position/target playback curves
//! - [`interpolate`] for orientation and focal-length blending between keys
//! - [`rebuild`] for sorting, simplifying and re-spacing raw camera records
//! - [`document`] for the versioned keyframe interchange format
//! - [`FrameImages`] for frame-to-reference-image bookkeeping

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Frame numbers and counts move between integer and float domains constantly
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod convention;
pub mod document;
pub mod error;
pub mod images;
pub mod interpolate;
pub mod keyframe;
pub mod options;
pub mod record;
pub mod rebuild;
pub mod spline;

pub use convention::{look_at_basis, quat_slerp};
pub use document::{KeyframeDocument, PoseRecord, PoseSet, PoseSetEntry, DOCUMENT_VERSION};
pub use error::{PoseTrackError, Result};
pub use images::{FolderMatch, FrameImages, ImageRequest, ImageTicket, LoadedImage};
pub use interpolate::{FieldOfView, FocalLength, Interpolated, PosePlayback, Viewport};
pub use keyframe::{Insertion, Keyframe, KeyframeStore, ObjectId};
pub use options::EngineOptions;
pub use record::{parse_records, Intrinsics, RawCameraRecord};
pub use rebuild::{RebuildPlan, RebuildRequest};
pub use spline::{CubicSpline, PoseSpline};

// Re-export glam types for convenience
pub use glam::{DMat3, DQuat, DVec3};
