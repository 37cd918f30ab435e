//! Orientation and focal-length interpolation between bracketing keyframes.
//!
//! Position and target come from the [`PoseSpline`]; rotation and intrinsics
//! are blended independently between the two keyframes around the current
//! time. Focal lengths are blended in the field-of-view domain because pixel
//! focal length is not linear in view angle.

use glam::{DMat3, DVec3};

use crate::convention::{quat_from_mat3, quat_slerp};
use crate::keyframe::Keyframe;
use crate::spline::PoseSpline;

/// Viewport size in pixels, used to convert between focal length and field of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    /// Creates a viewport. Dimensions are clamped to at least one pixel.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
        }
    }

    /// Width over height.
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// Focal lengths in pixels. Either axis may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FocalLength {
    pub fx: Option<f64>,
    pub fy: Option<f64>,
}

/// Fields of view in radians. Either axis may be unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldOfView {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

impl FocalLength {
    pub fn new(fx: Option<f64>, fy: Option<f64>) -> Self {
        Self {
            fx: fx.filter(|v| v.is_finite()),
            fy: fy.filter(|v| v.is_finite()),
        }
    }

    /// Converts to fields of view, deriving a missing axis through the aspect ratio.
    pub fn to_fov(self, viewport: Viewport) -> FieldOfView {
        let aspect = viewport.aspect_ratio();
        let mut x = self.fx.map(|fx| 2.0 * (viewport.width / (2.0 * fx)).atan());
        let mut y = self.fy.map(|fy| 2.0 * (viewport.height / (2.0 * fy)).atan());

        if y.is_none() {
            y = x.map(|fov_x| 2.0 * ((fov_x / 2.0).tan() / aspect).atan());
        }
        if x.is_none() {
            x = y.map(|fov_y| 2.0 * ((fov_y / 2.0).tan() * aspect).atan());
        }
        FieldOfView { x, y }
    }
}

impl FieldOfView {
    /// Converts back to pixel focal lengths.
    pub fn to_focal(self, viewport: Viewport) -> FocalLength {
        FocalLength {
            fx: self.x.map(|fov| viewport.width / (2.0 * (fov / 2.0).tan())),
            fy: self.y.map(|fov| viewport.height / (2.0 * (fov / 2.0).tan())),
        }
    }

    /// Linear blend per axis. An axis known on only one side holds that side's value.
    pub fn lerp(self, other: Self, u: f64) -> Self {
        let blend = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) => Some(a * (1.0 - u) + b * u),
            (a, b) => a.or(b),
        };
        Self {
            x: blend(self.x, other.x),
            y: blend(self.y, other.y),
        }
    }
}

/// Indices of the keyframes bracketing `time` and the blend factor between them.
///
/// `frames` must be sorted. Times before the first key clamp to it, times at
/// or after the last key hold it.
pub fn bracket(frames: &[u32], time: f64) -> Option<(usize, usize, f64)> {
    if frames.is_empty() {
        return None;
    }
    let mut i0 = 0;
    while i0 + 1 < frames.len() && f64::from(frames[i0 + 1]) <= time {
        i0 += 1;
    }
    let i1 = (i0 + 1).min(frames.len() - 1);
    let f0 = f64::from(frames[i0]);
    let f1 = f64::from(frames[i1]);
    let u = ((time - f0) / (f1 - f0).max(1.0)).clamp(0.0, 1.0);
    Some((i0, i1, u))
}

/// Orientation (internal convention) between two keyframes.
///
/// Slerps when both sides carry a rotation, holds the one that does
/// otherwise, and returns `None` when neither does.
pub fn interpolate_rotation(k0: &Keyframe, k1: &Keyframe, u: f64) -> Option<DMat3> {
    match (k0.internal_rotation(), k1.internal_rotation()) {
        (Some(m0), Some(m1)) => {
            let q = quat_slerp(quat_from_mat3(m0), quat_from_mat3(m1), u);
            Some(DMat3::from_quat(q))
        }
        (m0, m1) => m0.or(m1),
    }
}

/// Focal lengths between two keyframes, blended in the field-of-view domain.
pub fn interpolate_focal(k0: &Keyframe, k1: &Keyframe, u: f64, viewport: Viewport) -> FocalLength {
    let fov0 = FocalLength::new(k0.fx, k0.fy).to_fov(viewport);
    let fov1 = FocalLength::new(k1.fx, k1.fy).to_fov(viewport);
    fov0.lerp(fov1, u).to_focal(viewport)
}

/// Everything evaluated for one displayed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interpolated {
    pub position: DVec3,
    pub target: DVec3,
    /// Internal-convention orientation, if any keyframe carries one.
    pub rotation: Option<DMat3>,
    pub focal: FocalLength,
}

/// Playback state derived from one pose track: the spline plus the keys it was fitted to.
#[derive(Debug, Clone)]
pub struct PosePlayback {
    spline: PoseSpline,
    keys: Vec<Keyframe>,
    frames: Vec<u32>,
}

impl PosePlayback {
    /// Builds playback for a track. `None` when fewer than two keys are in range.
    pub fn build(keyframes: &[Keyframe], frame_count: u32, tension: f64) -> Option<Self> {
        let spline = PoseSpline::build(keyframes, frame_count, tension)?;
        let mut keys: Vec<Keyframe> = keyframes
            .iter()
            .filter(|k| k.frame < frame_count)
            .cloned()
            .collect();
        keys.sort_by_key(|k| k.frame);
        let frames = keys.iter().map(|k| k.frame).collect();
        Some(Self { spline, keys, frames })
    }

    /// Keyframes the playback was built from, ordered by frame.
    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    /// Evaluates every channel at `time`.
    pub fn sample(&self, time: f64, viewport: Viewport) -> Interpolated {
        let (position, target) = self.spline.evaluate(time);
        let (rotation, focal) = match bracket(&self.frames, time) {
            Some((i0, i1, u)) => {
                let (k0, k1) = (&self.keys[i0], &self.keys[i1]);
                (
                    interpolate_rotation(k0, k1, u),
                    interpolate_focal(k0, k1, u, viewport),
                )
            }
            None => (None, FocalLength::default()),
        };
        Interpolated {
            position,
            target,
            rotation,
            focal,
        }
    }
}
