//! posetrack: camera keyframe recording and playback for 3D scene viewers.
//!
//! The engine records camera viewpoints as timed keyframes on a scene object
//! and plays back a smooth camera path between them. Position and look-at
//! target follow a periodic cubic spline, orientation is slerped between the
//! bracketing keys, and focal length is blended in the field-of-view domain.
//!
//! # Quick Start
//!
//! ```no_run
//! use posetrack::*;
//!
//! fn import(host: &mut dyn Host, json: &str) -> Result<()> {
//!     init_logging();
//!
//!     let mut engine = PoseEngine::new(EngineOptions::default());
//!     engine.on_selection_changed(host);
//!     engine.import_json(host, json)?;
//!
//!     // Once per displayed frame
//!     let time = host.current_frame();
//!     engine.on_frame_changed(host, time);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`PoseEngine`] owns all state of one editor session
//! - [`Host`] is implemented by the embedding viewer
//! - [`JumpAnimation`] drives snap-to-keyframe transitions
//! - [`ImageLoader`] resolves reference images asynchronously
//!
//! Host-independent logic lives in `posetrack-core` and is re-exported here.

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Frame numbers move between integer and float domains
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod engine;
pub mod host;
pub mod jump;
pub mod loader;

// Re-export core types
pub use posetrack_core::{
    convention, document, images, interpolate, keyframe, rebuild, record, spline,
    error::{PoseTrackError, Result},
    options::EngineOptions,
    DMat3, DQuat, DVec3, FieldOfView, FocalLength, FolderMatch, FrameImages, ImageRequest,
    ImageTicket, Insertion, Interpolated, Keyframe, KeyframeDocument, KeyframeStore, LoadedImage,
    ObjectId, PosePlayback, PoseRecord, PoseSet, PoseSetEntry, RawCameraRecord, Viewport,
};

pub use engine::PoseEngine;
pub use host::{CameraPose, CameraView, Host, MessageKind};
pub use jump::{CancelToken, JumpAnimation, JumpSample, JumpStart, JumpTick};
pub use loader::{FsImageLoader, ImageFuture, ImageLoader};

/// Initializes logging through `env_logger`.
///
/// Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::try_init();
}
