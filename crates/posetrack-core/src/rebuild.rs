//! Simplification and rebuild pipeline.
//!
//! Turns a list of raw camera records into a pose track: natural-sort the
//! records, optionally thin them to an evenly spaced subset, derive a look-at
//! target for each, and spread the survivors across the timeline.

use std::collections::BTreeMap;

use glam::DVec3;

use crate::convention::{flip_position, flip_rotation, forward_axis};
use crate::interpolate::{FocalLength, Interpolated};
use crate::keyframe::Keyframe;
use crate::options::EngineOptions;
use crate::record::{trailing_index, RawCameraRecord};

/// Inputs of one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct RebuildRequest<'a> {
    pub records: &'a [RawCameraRecord],
    pub simplify: bool,
    pub max_keyframes: usize,
    pub min_frame_gap: u32,
    /// Current timeline length; zero means "use the default".
    pub base_frames: u32,
}

impl<'a> RebuildRequest<'a> {
    /// A request using the thresholds from `options`.
    pub fn new(records: &'a [RawCameraRecord], options: &EngineOptions, base_frames: u32) -> Self {
        let base_frames = if base_frames == 0 {
            options.default_frame_count
        } else {
            base_frames
        };
        Self {
            records,
            simplify: options.simplify,
            max_keyframes: options.max_simplified_keyframes,
            min_frame_gap: options.min_frame_gap,
            base_frames,
        }
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct RebuildPlan {
    /// The new pose track, ordered by frame.
    pub keyframes: Vec<Keyframe>,
    /// Timeline length to install.
    pub frame_count: u32,
    /// Frames between consecutive keyframes.
    pub step: u32,
    /// Indices of the selected records within `sorted`.
    pub selected: Vec<usize>,
    /// All records in natural order.
    pub sorted: Vec<RawCameraRecord>,
    /// Mean raw position of every record.
    pub scene_center: DVec3,
    /// Half the mean distance of the selected records to the center (at least 1).
    pub look_at_distance: f64,
    /// Expected image name per keyframe frame.
    pub image_names: BTreeMap<u32, String>,
    /// View of the first selected record that carries a rotation.
    pub initial_view: Option<Interpolated>,
}

impl RebuildPlan {
    /// Frames of the new track.
    pub fn frames(&self) -> Vec<u32> {
        self.keyframes.iter().map(|k| k.frame).collect()
    }
}

/// Sorts records by the trailing number of their image name.
///
/// Records without a number go last; the sort is stable. Nothing moves when
/// no record has a number.
pub fn sort_records(records: &mut [RawCameraRecord]) {
    let key = |r: &RawCameraRecord| r.image_name().and_then(trailing_index).unwrap_or(u64::MAX);
    if records.iter().any(|r| key(r) != u64::MAX) {
        records.sort_by_key(key);
    }
}

/// Evenly spaced indices `round(i * (total - 1) / (max - 1))`, deduplicated.
///
/// Returns every index when `total <= max`.
pub fn select_indices(total: usize, max: usize) -> Vec<usize> {
    if total <= max {
        return (0..total).collect();
    }
    if max <= 1 {
        return vec![0];
    }
    let mut indices: Vec<usize> = Vec::with_capacity(max);
    for i in 0..max {
        let index = (i as f64 * (total - 1) as f64 / (max - 1) as f64).round() as usize;
        if !indices.contains(&index) {
            indices.push(index);
        }
    }
    indices
}

/// Frame step and timeline length for `n` keyframes.
///
/// `step = max(min_gap, ceil((base_frames - 1) / (n - 1)))` and the timeline
/// becomes `step * (n - 1) + 1`. A single keyframe sits at frame 0 and leaves
/// the timeline alone.
pub fn frame_spacing(n: usize, base_frames: u32, min_gap: u32) -> (u32, u32) {
    let base_frames = base_frames.max(1);
    if n <= 1 {
        return (1, base_frames);
    }
    let steps = (n - 1) as u32;
    let step = min_gap.max((base_frames - 1).div_ceil(steps));
    (step, step * steps + 1)
}

/// Mean position of all records.
pub fn scene_center(records: &[RawCameraRecord]) -> DVec3 {
    if records.is_empty() {
        return DVec3::ZERO;
    }
    let sum: DVec3 = records.iter().map(|r| r.position).sum();
    sum / records.len() as f64
}

/// Half the mean distance of `records` to `center`, at least 1; 5 when empty.
pub fn look_at_distance<'a>(records: impl ExactSizeIterator<Item = &'a RawCameraRecord>, center: DVec3) -> f64 {
    let count = records.len();
    if count == 0 {
        return 5.0;
    }
    let total: f64 = records.map(|r| r.position.distance(center)).sum();
    (total / count as f64 * 0.5).max(1.0)
}

/// Converts one record into a keyframe at `frame`.
///
/// An explicit target is used as given. Otherwise a rotation aims the camera
/// along its forward axis at the point closest to the scene center, and both
/// points are flipped into the internal convention. Without either, the
/// camera looks at the scene center.
pub fn record_to_keyframe(record: &RawCameraRecord, index: usize, frame: u32, center: DVec3) -> Keyframe {
    let p = record.position;
    let (position, target) = match (record.target, record.rotation) {
        (Some(target), _) => (p, target),
        (None, Some(rotation)) => {
            let forward = forward_axis(rotation);
            let along = (center - p).dot(forward);
            (flip_position(p), flip_position(p + forward * along))
        }
        (None, None) => (p, center),
    };

    Keyframe {
        name: record.display_name(index),
        frame,
        position,
        target,
        raw_rotation: record.rotation,
        raw_position: Some(p),
        fx: record.intrinsics.fx,
        fy: record.intrinsics.fy,
        camera_id: Some(record.camera_id(index)),
        image_name: record.image_name().map(str::to_string),
    }
}

/// Runs the full pipeline.
pub fn plan(request: &RebuildRequest<'_>) -> RebuildPlan {
    let mut sorted = request.records.to_vec();
    sort_records(&mut sorted);

    let selected = if request.simplify {
        select_indices(sorted.len(), request.max_keyframes)
    } else {
        (0..sorted.len()).collect()
    };

    let scene_center = scene_center(&sorted);
    let look_at_distance = look_at_distance(selected.iter().map(|&i| &sorted[i]), scene_center);
    let (step, frame_count) = frame_spacing(selected.len(), request.base_frames, request.min_frame_gap);

    let mut keyframes = Vec::with_capacity(selected.len());
    let mut image_names = BTreeMap::new();
    let mut initial_view = None;

    for (index, &record_index) in selected.iter().enumerate() {
        let record = &sorted[record_index];
        let frame = if selected.len() > 1 { index as u32 * step } else { 0 };
        let keyframe = record_to_keyframe(record, index, frame, scene_center);

        if initial_view.is_none() {
            if let Some(rotation) = record.rotation {
                let target = record.target.map_or(keyframe.target, flip_position);
                initial_view = Some(Interpolated {
                    position: flip_position(record.position),
                    target,
                    rotation: Some(flip_rotation(rotation)),
                    focal: FocalLength::new(record.intrinsics.fx, record.intrinsics.fy),
                });
            }
        }
        if let Some(name) = &keyframe.image_name {
            image_names.insert(frame, name.clone());
        }
        keyframes.push(keyframe);
    }

    log::debug!(
        "rebuild: {} of {} records, step {step}, {frame_count} frames",
        selected.len(),
        sorted.len()
    );

    RebuildPlan {
        keyframes,
        frame_count,
        step,
        selected,
        sorted,
        scene_center,
        look_at_distance,
        image_names,
        initial_view,
    }
}
