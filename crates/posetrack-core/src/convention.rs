//! Axis conventions and rotation helpers.
//!
//! Three bases meet in this crate:
//!
//! - **raw**: the convention of imported camera records. Rotation columns are
//!   the camera's right/down/forward axes in world space (forward = +Z).
//! - **internal**: the viewer convention used by every emitted camera command.
//!   It is the raw basis with the X and Y world axes negated
//!   (`diag(-1, -1, 1) * raw`); positions follow the same flip.
//! - **renderer**: the live camera's own orientation as reported by the host,
//!   whose forward is -Z. Its Y and Z columns are negated relative to the
//!   internal basis.
//!
//! Every flip here is an involution, so the same function converts both ways.

use glam::{DMat3, DQuat, DVec3};

/// Sign flip applied to the world X and Y axes between raw and internal space.
pub const FLIP_XY: DMat3 = DMat3::from_cols(DVec3::NEG_X, DVec3::NEG_Y, DVec3::Z);

/// Sign flip applied to the camera Y and Z axes between renderer and internal space.
pub const FLIP_CAMERA_YZ: DMat3 = DMat3::from_cols(DVec3::X, DVec3::NEG_Y, DVec3::NEG_Z);

/// Converts a raw rotation into the internal convention (and back).
#[must_use]
pub fn flip_rotation(rotation: DMat3) -> DMat3 {
    FLIP_XY * rotation
}

/// Converts a raw position into the internal convention (and back).
#[must_use]
pub fn flip_position(position: DVec3) -> DVec3 {
    DVec3::new(-position.x, -position.y, position.z)
}

/// Converts a renderer-basis orientation matrix into the internal convention (and back).
#[must_use]
pub fn renderer_to_internal(basis: DMat3) -> DMat3 {
    basis * FLIP_CAMERA_YZ
}

/// Converts a live renderer orientation into a raw-convention rotation matrix.
///
/// Keyframes captured from the live camera store this so they interpolate and
/// export exactly like imported cameras.
#[must_use]
pub fn raw_from_renderer(orientation: DQuat) -> DMat3 {
    flip_rotation(renderer_to_internal(DMat3::from_quat(orientation)))
}

/// The camera's forward axis (third rotation column) in the rotation's own space.
#[must_use]
pub fn forward_axis(rotation: DMat3) -> DVec3 {
    rotation.z_axis
}

/// Builds a matrix from row-major nested arrays.
#[must_use]
pub fn mat3_from_rows(rows: [[f64; 3]; 3]) -> DMat3 {
    DMat3::from_cols_array_2d(&rows).transpose()
}

/// Returns the matrix as row-major nested arrays.
#[must_use]
pub fn mat3_to_rows(m: DMat3) -> [[f64; 3]; 3] {
    m.transpose().to_cols_array_2d()
}

/// Unit quaternion of a rotation matrix.
#[must_use]
pub fn quat_from_mat3(m: DMat3) -> DQuat {
    DQuat::from_mat3(&m).normalize()
}

/// Spherical linear interpolation along the shortest arc.
///
/// Uses the closed-form `sin((1-t)θ)/sinθ, sin(tθ)/sinθ` weights and falls back
/// to a normalized lerp when the quaternions are nearly parallel.
#[must_use]
pub fn quat_slerp(a: DQuat, b: DQuat, t: f64) -> DQuat {
    let mut b = b;
    let mut cos = a.dot(b);
    if cos < 0.0 {
        b = -b;
        cos = -cos;
    }

    let (k0, k1) = if 1.0 - cos > 1e-6 {
        let theta = cos.clamp(-1.0, 1.0).acos();
        let sin = theta.sin();
        (((1.0 - t) * theta).sin() / sin, (t * theta).sin() / sin)
    } else {
        (1.0 - t, t)
    };

    (a * k0 + b * k1).normalize()
}

/// Orientation (internal convention) of a camera at `position` looking at `target`.
///
/// Columns are `[right, up, forward]`. Roll is not recoverable from a
/// position/target pair, so world +Y is used as the up hint (+Z when the view
/// direction is vertical).
#[must_use]
pub fn look_at_basis(position: DVec3, target: DVec3) -> DMat3 {
    let Some(forward) = (target - position).try_normalize() else {
        return DMat3::IDENTITY;
    };

    let mut right = DVec3::Y.cross(forward);
    if right.length() < 1e-4 {
        right = DVec3::Z.cross(forward);
    }
    let right = right.normalize();
    let up = forward.cross(right).normalize();

    DMat3::from_cols(right, up, forward)
}
