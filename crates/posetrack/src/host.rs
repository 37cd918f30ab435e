//! The boundary between the engine and the viewer that embeds it.
//!
//! The engine never reaches into renderer or widget state. It queries the
//! host through [`Host`] and answers with camera and timeline commands.

use glam::{DMat3, DQuat, DVec3};
use posetrack_core::{LoadedImage, ObjectId, Viewport};

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Info,
    Warning,
    Error,
}

/// Camera position and look-at target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: DVec3,
    pub target: DVec3,
}

/// Combined camera command applied atomically by the host.
///
/// `rotation` is in the internal convention with columns right, up and
/// forward. Channels left as `None` keep their live value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub position: DVec3,
    pub target: Option<DVec3>,
    pub rotation: Option<DMat3>,
    pub fx: Option<f64>,
    pub fy: Option<f64>,
    /// Transition speed; zero applies the view immediately.
    pub speed: f64,
}

impl CameraView {
    /// A view that only moves the camera.
    pub fn at(position: DVec3) -> Self {
        Self {
            position,
            target: None,
            rotation: None,
            fx: None,
            fy: None,
            speed: 0.0,
        }
    }
}

/// Queries and commands the engine needs from the embedding viewer.
pub trait Host {
    /// The selected scene object, if any.
    fn selection(&self) -> Option<ObjectId>;

    /// Display name of a scene object.
    fn object_name(&self, object: ObjectId) -> String;

    /// Resolves a scene object by name, for restoring project documents.
    fn find_object(&self, _name: &str) -> Option<ObjectId> {
        None
    }

    /// Displayed timeline frame. May be fractional during playback.
    fn current_frame(&self) -> f64;

    fn set_current_frame(&mut self, frame: u32);

    /// Timeline length in frames.
    fn frame_count(&self) -> u32;

    fn set_frame_count(&mut self, count: u32);

    fn frame_rate(&self) -> f64;

    fn is_playing(&self) -> bool;

    fn set_playing(&mut self, playing: bool);

    /// Live camera position and target.
    fn camera_pose(&self) -> CameraPose;

    /// Live camera orientation in the renderer basis (forward is -Z).
    fn camera_orientation(&self) -> Option<DQuat>;

    fn viewport(&self) -> Viewport;

    /// Shows a modal message to the user.
    fn show_message(&mut self, kind: MessageKind, header: &str, body: &str);

    fn set_camera_view(&mut self, view: CameraView);

    fn set_camera_pose(&mut self, pose: CameraPose, speed: f64);

    /// Marks which timeline frames hold keyframes of `object`.
    fn set_keyframe_marks(&mut self, object: ObjectId, frames: &[u32]);

    /// Asks the host to redraw selection-dependent UI.
    fn refresh_selection(&mut self);

    /// Shows the reference images of `frame`.
    fn display_images(&mut self, _frame: u32, _images: &[LoadedImage]) {}
}
