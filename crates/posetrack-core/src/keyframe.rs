//! Keyframes and the per-object keyframe store.

use std::collections::HashMap;

use glam::{DMat3, DVec3};

use crate::convention::{flip_position, flip_rotation};

/// Opaque identity of a scene object owned by the host scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

/// A timed camera pose.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    /// Display name of the keyframe.
    pub name: String,
    /// Timeline frame. Unique within a track.
    pub frame: u32,
    /// Camera position (internal convention).
    pub position: DVec3,
    /// Look-at target (internal convention).
    pub target: DVec3,
    /// Rotation in the raw convention, kept verbatim for lossless export.
    pub raw_rotation: Option<DMat3>,
    /// Position exactly as imported, before any convention flip.
    pub raw_position: Option<DVec3>,
    /// Horizontal focal length in pixels.
    pub fx: Option<f64>,
    /// Vertical focal length in pixels.
    pub fy: Option<f64>,
    /// Camera identifier shown in captions.
    pub camera_id: Option<String>,
    /// Expected base name of the matching reference image.
    pub image_name: Option<String>,
}

impl Keyframe {
    /// Creates a keyframe with no rotation or intrinsics.
    pub fn new(name: impl Into<String>, frame: u32, position: DVec3, target: DVec3) -> Self {
        Self {
            name: name.into(),
            frame,
            position,
            target,
            raw_rotation: None,
            raw_position: None,
            fx: None,
            fy: None,
            camera_id: None,
            image_name: None,
        }
    }

    /// Sets the raw-convention rotation.
    #[must_use]
    pub fn with_raw_rotation(mut self, rotation: DMat3) -> Self {
        self.raw_rotation = Some(rotation);
        self
    }

    /// Sets the focal lengths.
    #[must_use]
    pub fn with_focal(mut self, fx: Option<f64>, fy: Option<f64>) -> Self {
        self.fx = fx;
        self.fy = fy;
        self
    }

    /// Rotation converted to the internal convention.
    pub fn internal_rotation(&self) -> Option<DMat3> {
        self.raw_rotation.map(flip_rotation)
    }

    /// Position in the raw convention for export.
    ///
    /// Prefers the imported position; otherwise undoes the internal flip.
    pub fn export_position(&self) -> DVec3 {
        self.raw_position
            .unwrap_or_else(|| flip_position(self.position))
    }
}

/// Result of [`KeyframeStore::add_or_replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// A new keyframe was inserted at this index.
    Inserted(usize),
    /// The keyframe at this index had the same frame and was overwritten.
    Replaced(usize),
}

/// Pose tracks keyed by scene object.
///
/// Each track is kept sorted by frame, and frames are unique within a track.
#[derive(Debug, Default, Clone)]
pub struct KeyframeStore {
    tracks: HashMap<ObjectId, Vec<Keyframe>>,
}

impl KeyframeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keyframes of an object, ordered by frame. Empty if the object has no track.
    pub fn track(&self, object: ObjectId) -> &[Keyframe] {
        self.tracks.get(&object).map_or(&[], Vec::as_slice)
    }

    /// Returns whether the object owns a track (possibly empty).
    pub fn has_track(&self, object: ObjectId) -> bool {
        self.tracks.contains_key(&object)
    }

    /// Creates an empty track for the object if it has none.
    pub fn ensure_track(&mut self, object: ObjectId) {
        self.tracks.entry(object).or_default();
    }

    /// Inserts a keyframe, or overwrites the one already at the same frame.
    pub fn add_or_replace(&mut self, object: ObjectId, keyframe: Keyframe) -> Insertion {
        let track = self.tracks.entry(object).or_default();
        let index = track.partition_point(|k| k.frame < keyframe.frame);

        if track.get(index).is_some_and(|k| k.frame == keyframe.frame) {
            track[index] = keyframe;
            Insertion::Replaced(index)
        } else {
            track.insert(index, keyframe);
            Insertion::Inserted(index)
        }
    }

    /// Removes the keyframe at `index` of the object's track.
    pub fn remove(&mut self, object: ObjectId, index: usize) -> Option<Keyframe> {
        let track = self.tracks.get_mut(&object)?;
        (index < track.len()).then(|| track.remove(index))
    }

    /// Replaces the whole track of an object.
    ///
    /// Later entries win when frames collide.
    pub fn replace_track(&mut self, object: ObjectId, keyframes: Vec<Keyframe>) {
        self.tracks.insert(object, Vec::new());
        for keyframe in keyframes {
            self.add_or_replace(object, keyframe);
        }
    }

    /// Removes an object's track entirely.
    pub fn remove_track(&mut self, object: ObjectId) -> Option<Vec<Keyframe>> {
        self.tracks.remove(&object)
    }

    /// Keyframes that fall inside a timeline of `frame_count` frames, ordered by frame.
    pub fn eligible(&self, object: ObjectId, frame_count: u32) -> Vec<Keyframe> {
        self.track(object)
            .iter()
            .filter(|k| k.frame < frame_count)
            .cloned()
            .collect()
    }

    /// Frame numbers of an object's keyframes.
    pub fn frames(&self, object: ObjectId) -> Vec<u32> {
        self.track(object).iter().map(|k| k.frame).collect()
    }

    /// The keyframe whose position is closest to `position`.
    ///
    /// Ties resolve to the earliest keyframe in frame order.
    pub fn nearest(&self, object: ObjectId, position: DVec3) -> Option<&Keyframe> {
        let mut best: Option<(&Keyframe, f64)> = None;
        for keyframe in self.track(object) {
            let distance = keyframe.position.distance(position);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((keyframe, distance));
            }
        }
        best.map(|(k, _)| k)
    }

    /// Iterates over all non-empty tracks.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &[Keyframe])> {
        self.tracks
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(id, t)| (*id, t.as_slice()))
    }

    /// Removes every track.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}
