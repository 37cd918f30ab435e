//! Keyframe interchange documents.
//!
//! Two formats live here:
//! - [`KeyframeDocument`], the versioned export of one object's track in the
//!   raw camera convention (no targets, original rotations and intrinsics).
//! - [`PoseSet`], the per-object track list embedded in project documents,
//!   which stores internal positions and targets as-is.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::convention::mat3_to_rows;
use crate::error::Result;
use crate::keyframe::Keyframe;

/// Version written by [`KeyframeDocument`].
pub const DOCUMENT_VERSION: u32 = 2;

/// One exported keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRecord {
    pub name: String,
    pub frame: u32,
    /// Position in the raw convention.
    pub position: [f64; 3],
    /// Raw rotation, row-major.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[[f64; 3]; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fy: Option<f64>,
}

impl PoseRecord {
    /// Converts a keyframe back to the raw convention.
    pub fn from_keyframe(keyframe: &Keyframe) -> Self {
        Self {
            name: keyframe.name.clone(),
            frame: keyframe.frame,
            position: keyframe.export_position().to_array(),
            rotation: keyframe.raw_rotation.map(mat3_to_rows),
            fx: keyframe.fx.filter(|v| v.is_finite()),
            fy: keyframe.fy.filter(|v| v.is_finite()),
        }
    }
}

/// Versioned export of one object's pose track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyframeDocument {
    pub version: u32,
    pub object_name: String,
    pub frame_count: u32,
    pub frame_rate: f64,
    /// ISO-8601 creation time.
    pub timestamp: String,
    pub poses: Vec<PoseRecord>,
}

impl KeyframeDocument {
    /// Builds a document from a track.
    pub fn from_track(
        object_name: impl Into<String>,
        keyframes: &[Keyframe],
        frame_count: u32,
        frame_rate: f64,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            object_name: object_name.into(),
            frame_count,
            frame_rate,
            timestamp: timestamp.into(),
            poses: keyframes.iter().map(PoseRecord::from_keyframe).collect(),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Suggested file name for the export.
    pub fn file_name(&self) -> String {
        format!("{}_keyframes.json", self.object_name)
    }
}

/// One keyframe of a project-document pose set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSetEntry {
    pub name: String,
    #[serde(default)]
    pub frame: Option<u32>,
    pub position: [f64; 3],
    pub target: [f64; 3],
}

/// All keyframes of one object in a project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSet {
    /// Name of the owning scene object.
    pub name: String,
    pub poses: Vec<PoseSetEntry>,
}

impl PoseSet {
    /// Captures a track.
    pub fn from_track(name: impl Into<String>, keyframes: &[Keyframe]) -> Self {
        Self {
            name: name.into(),
            poses: keyframes
                .iter()
                .map(|k| PoseSetEntry {
                    name: k.name.clone(),
                    frame: Some(k.frame),
                    position: k.position.to_array(),
                    target: k.target.to_array(),
                })
                .collect(),
        }
    }

    /// Restores the keyframes. Entries without a frame get `index * frame_rate`.
    pub fn to_keyframes(&self, frame_rate: f64) -> Vec<Keyframe> {
        self.poses
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let frame = entry
                    .frame
                    .unwrap_or_else(|| (index as f64 * frame_rate).round() as u32);
                Keyframe::new(
                    entry.name.clone(),
                    frame,
                    DVec3::from_array(entry.position),
                    DVec3::from_array(entry.target),
                )
            })
            .collect()
    }
}
