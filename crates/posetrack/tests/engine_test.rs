//! Engine-level tests driven through a recording host.

use std::collections::HashMap;
use std::path::PathBuf;

use posetrack::*;

/// Host double that records every command it receives.
struct MockHost {
    selection: Option<ObjectId>,
    names: HashMap<ObjectId, String>,
    frame: f64,
    frame_count: u32,
    frame_rate: f64,
    playing: bool,
    pose: CameraPose,
    orientation: Option<DQuat>,
    viewport: Viewport,
    messages: Vec<(MessageKind, String, String)>,
    views: Vec<CameraView>,
    poses: Vec<CameraPose>,
    marks: HashMap<ObjectId, Vec<u32>>,
    refreshes: usize,
    displayed: Vec<(u32, Vec<String>)>,
}

impl MockHost {
    fn new() -> Self {
        Self {
            selection: None,
            names: HashMap::new(),
            frame: 0.0,
            frame_count: 1200,
            frame_rate: 30.0,
            playing: false,
            pose: CameraPose {
                position: DVec3::ZERO,
                target: DVec3::NEG_Z,
            },
            orientation: None,
            viewport: Viewport::new(1920.0, 1080.0),
            messages: Vec::new(),
            views: Vec::new(),
            poses: Vec::new(),
            marks: HashMap::new(),
            refreshes: 0,
            displayed: Vec::new(),
        }
    }

    fn select(&mut self, id: u64, name: &str) -> ObjectId {
        let object = ObjectId(id);
        self.names.insert(object, name.to_string());
        self.selection = Some(object);
        object
    }

    fn last_message(&self) -> Option<&(MessageKind, String, String)> {
        self.messages.last()
    }

    fn has_message(&self, kind: MessageKind) -> bool {
        self.messages.iter().any(|(k, _, _)| *k == kind)
    }
}

impl Host for MockHost {
    fn selection(&self) -> Option<ObjectId> {
        self.selection
    }

    fn object_name(&self, object: ObjectId) -> String {
        self.names.get(&object).cloned().unwrap_or_default()
    }

    fn find_object(&self, name: &str) -> Option<ObjectId> {
        self.names.iter().find(|(_, n)| n.as_str() == name).map(|(o, _)| *o)
    }

    fn current_frame(&self) -> f64 {
        self.frame
    }

    fn set_current_frame(&mut self, frame: u32) {
        self.frame = f64::from(frame);
    }

    fn frame_count(&self) -> u32 {
        self.frame_count
    }

    fn set_frame_count(&mut self, count: u32) {
        self.frame_count = count;
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    fn camera_pose(&self) -> CameraPose {
        self.pose
    }

    fn camera_orientation(&self) -> Option<DQuat> {
        self.orientation
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn show_message(&mut self, kind: MessageKind, header: &str, body: &str) {
        self.messages.push((kind, header.to_string(), body.to_string()));
    }

    fn set_camera_view(&mut self, view: CameraView) {
        self.pose.position = view.position;
        if let Some(target) = view.target {
            self.pose.target = target;
        }
        self.views.push(view);
    }

    fn set_camera_pose(&mut self, pose: CameraPose, _speed: f64) {
        self.pose = pose;
        self.poses.push(pose);
    }

    fn set_keyframe_marks(&mut self, object: ObjectId, frames: &[u32]) {
        self.marks.insert(object, frames.to_vec());
    }

    fn refresh_selection(&mut self) {
        self.refreshes += 1;
    }

    fn display_images(&mut self, frame: u32, images: &[LoadedImage]) {
        self.displayed
            .push((frame, images.iter().map(|i| i.name.clone()).collect()));
    }
}

/// Loader that resolves every request to its first candidate without touching disk.
struct FakeLoader;

impl ImageLoader for FakeLoader {
    fn load(&self, request: &ImageRequest) -> ImageFuture {
        let result = request
            .candidates
            .first()
            .map(|path| LoadedImage {
                name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: path.clone(),
                width: 8,
                height: 6,
            })
            .ok_or_else(|| PoseTrackError::ImageNotFound(request.name.clone()));
        Box::pin(std::future::ready(result))
    }
}

fn camera_json(count: usize) -> String {
    let records: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            let angle = i as f64 * 0.1;
            let (s, c) = angle.sin_cos();
            serde_json::json!({
                "id": i,
                "img_name": format!("img_{i:03}"),
                "position": [i as f64 * 0.5, 1.25, -3.0 + i as f64 * 0.125],
                "rotation": [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]],
                "fx": 1000.0 + i as f64,
                "fy": 1001.0 + i as f64,
            })
        })
        .collect();
    serde_json::to_string(&records).unwrap()
}

fn engine() -> PoseEngine {
    PoseEngine::with_loader(EngineOptions::default(), Box::new(FakeLoader))
}

fn keyframe(frame: u32, x: f64) -> Keyframe {
    Keyframe::new(
        format!("k{frame}"),
        frame,
        DVec3::new(x, 0.0, 0.0),
        DVec3::new(x, 0.0, -5.0),
    )
}

fn run_jump(engine: &mut PoseEngine, host: &mut MockHost) {
    for _ in 0..1000 {
        if !engine.tick(host, 1.0 / 60.0) {
            return;
        }
    }
    panic!("jump never finished");
}

#[test]
fn test_add_requires_selection() {
    let mut host = MockHost::new();
    let mut engine = engine();

    let result = engine.add_keyframe(&mut host, keyframe(0, 0.0));
    assert!(matches!(result, Err(PoseTrackError::NoSelection)));
    assert_eq!(host.last_message().unwrap().0, MessageKind::Warning);
    assert_eq!(engine.store().iter().count(), 0);
}

#[test]
fn test_selection_creates_track_and_marks() {
    let mut host = MockHost::new();
    let mut engine = engine();
    let object = host.select(1, "splat");
    engine.on_selection_changed(&mut host);

    assert!(engine.store().has_track(object));
    assert!(engine.keyframes(&host).is_empty());
    assert_eq!(host.refreshes, 1);

    engine.add_keyframe(&mut host, keyframe(60, 1.0)).unwrap();
    engine.add_keyframe(&mut host, keyframe(0, 0.0)).unwrap();
    let replaced = engine.add_keyframe(&mut host, keyframe(60, 2.0)).unwrap();
    assert_eq!(replaced, Insertion::Replaced(1));
    assert_eq!(host.marks[&object], vec![0, 60]);
    assert_eq!(engine.keyframes(&host)[1].position.x, 2.0);

    let removed = engine.remove_keyframe(&mut host, 0).unwrap().unwrap();
    assert_eq!(removed.frame, 0);
    assert_eq!(host.marks[&object], vec![60]);
}

#[test]
fn test_playback_emits_pose_between_keys() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "splat");
    engine.on_selection_changed(&mut host);

    engine.add_keyframe(&mut host, keyframe(0, 0.0)).unwrap();
    engine.add_keyframe(&mut host, keyframe(60, 10.0)).unwrap();
    engine.add_keyframe(&mut host, keyframe(120, 40.0)).unwrap();
    assert!(engine.has_playback());

    engine.on_frame_changed(&mut host, 60.0);
    let at_key = *host.poses.last().unwrap();
    assert!((at_key.position.x - 10.0).abs() < 1e-9);

    engine.on_frame_changed(&mut host, 30.0);
    let between = host.poses.last().unwrap().position.x;
    assert!(between > 0.0 && between < 10.0);
    assert!(engine.caption().is_some());
    assert!(host.views.is_empty());
}

#[test]
fn test_capture_with_orientation_emits_view() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "splat");
    engine.on_selection_changed(&mut host);
    host.orientation = Some(DQuat::IDENTITY);

    host.frame = 0.0;
    host.pose.position = DVec3::new(0.0, 0.0, 5.0);
    engine.capture_keyframe(&mut host).unwrap();
    host.frame = 90.0;
    host.pose.position = DVec3::new(3.0, 0.0, 5.0);
    engine.capture_keyframe(&mut host).unwrap();

    let keys = engine.keyframes(&host);
    assert_eq!(keys[1].name, "camera_1");
    assert!(keys[0].raw_rotation.is_some());

    engine.on_frame_changed(&mut host, 45.0);
    let view = host.views.last().unwrap();
    let rotation = view.rotation.unwrap();
    // identity renderer orientation looks down -Z, which is the internal forward axis
    assert!((rotation.z_axis - DVec3::NEG_Z).length() < 1e-9);
    assert!(view.fx.is_none());
}

#[test]
fn test_import_simplified_25_records() {
    let mut host = MockHost::new();
    let options = EngineOptions {
        simplify: true,
        ..EngineOptions::default()
    };
    let mut engine = PoseEngine::with_loader(options, Box::new(FakeLoader));
    let object = host.select(7, "garden");
    engine.on_selection_changed(&mut host);

    let count = engine.import_json(&mut host, &camera_json(25)).unwrap();
    assert_eq!(count, 10);

    let keys = engine.keyframes(&host);
    let names: Vec<&str> = keys.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(
        names,
        ["img_000", "img_003", "img_005", "img_008", "img_011", "img_013", "img_016", "img_019", "img_021", "img_024"]
    );
    assert!(host.frame_count >= 163);
    let step = keys[1].frame - keys[0].frame;
    assert!(step >= 18);
    assert!(keys.windows(2).all(|w| w[1].frame - w[0].frame == step));
    assert_eq!(host.frame_count, step * 9 + 1);
    assert_eq!(host.marks[&object].len(), 10);

    // first record with a rotation restores the view
    let initial = host.views.first().unwrap();
    assert_eq!(initial.position, DVec3::new(-0.0, -1.25, -3.0));
    assert_eq!(initial.fx, Some(1000.0));
    assert_eq!(host.last_message().unwrap().0, MessageKind::Info);

    engine.set_simplify(&mut host, false);
    assert_eq!(engine.keyframes(&host).len(), 25);
    engine.set_simplify(&mut host, true);
    assert_eq!(engine.keyframes(&host).len(), 10);
}

#[test]
fn test_malformed_import_keeps_track() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "splat");
    engine.on_selection_changed(&mut host);
    engine.add_keyframe(&mut host, keyframe(0, 0.0)).unwrap();

    let err = engine.import_json(&mut host, r#"{"cameras": []}"#).unwrap_err();
    assert!(matches!(err, PoseTrackError::UnsupportedDocument));
    assert_eq!(host.last_message().unwrap().0, MessageKind::Error);

    let err = engine
        .import_json(&mut host, r#"[{"position": [0, 0, 0]}, {"position": [1, 2]}]"#)
        .unwrap_err();
    assert!(matches!(err, PoseTrackError::InvalidPosition { index: 1, len: 2 }));

    let err = engine.import_json(&mut host, "not json").unwrap_err();
    assert!(matches!(err, PoseTrackError::JsonError(_)));

    assert_eq!(engine.keyframes(&host).len(), 1);
    assert_eq!(engine.keyframes(&host)[0].name, "k0");
}

#[test]
fn test_missing_orientation_warns_and_imports() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "splat");
    engine.on_selection_changed(&mut host);

    let json = r#"[
        {"name": "a_1", "position": [2, 0, 0]},
        {"name": "a_2", "position": [-2, 0, 0]},
        {"name": "a_3", "position": [0, 0, 4], "target": [0, 0, 0]}
    ]"#;
    assert_eq!(engine.import_json(&mut host, json).unwrap(), 3);
    assert!(host.has_message(MessageKind::Warning));

    let keys = engine.keyframes(&host);
    let center = DVec3::new(0.0, 0.0, 4.0 / 3.0);
    assert!((keys[0].target - center).length() < 1e-12);
    assert_eq!(keys[2].target, DVec3::ZERO);
    // no record carries a rotation, so nothing is restored
    assert!(host.views.is_empty());
}

#[test]
fn test_export_import_round_trip() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "garden");
    engine.on_selection_changed(&mut host);
    engine.import_json(&mut host, &camera_json(6)).unwrap();
    let original: Vec<Keyframe> = engine.keyframes(&host).to_vec();

    let json = engine.export_json(&mut host).unwrap();
    let document: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(document["version"], 2);
    assert_eq!(document["objectName"], "garden");
    assert!(document["poses"][0].get("target").is_none());

    host.select(2, "copy");
    engine.on_selection_changed(&mut host);
    engine.import_json(&mut host, &json).unwrap();
    let restored = engine.keyframes(&host);

    assert_eq!(restored.len(), original.len());
    for (a, b) in original.iter().zip(restored) {
        assert_eq!(a.raw_position, b.raw_position);
        assert_eq!(a.raw_rotation, b.raw_rotation);
        assert_eq!(a.fx, b.fx);
        assert_eq!(a.fy, b.fy);
    }
}

#[test]
fn test_save_requires_keyframes() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "splat");
    engine.on_selection_changed(&mut host);

    let dir = std::env::temp_dir();
    assert!(matches!(engine.save_to_dir(&mut host, &dir), Err(PoseTrackError::EmptyTrack)));

    engine.add_keyframe(&mut host, keyframe(0, 1.0)).unwrap();
    let dir = dir.join(format!("posetrack_save_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = engine.save_to_dir(&mut host, &dir).unwrap();
    assert_eq!(path.file_name().unwrap(), "splat_keyframes.json");

    let count = engine.load_from_path(&mut host, &path).unwrap();
    assert_eq!(count, 1);
    // position survives export through the inverse flip
    assert_eq!(engine.keyframes(&host)[0].raw_position, Some(DVec3::new(-1.0, 0.0, 0.0)));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_jump_requires_keyframes() {
    let mut host = MockHost::new();
    let mut engine = engine();
    assert!(matches!(engine.jump_to_nearest(&mut host), Err(PoseTrackError::NoSelection)));

    host.select(1, "splat");
    engine.on_selection_changed(&mut host);
    assert!(matches!(engine.jump_to_nearest(&mut host), Err(PoseTrackError::EmptyTrack)));
    assert!(!engine.is_jumping());
}

#[test]
fn test_jump_supersedes_and_lands_on_keyframe() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "splat");
    engine.on_selection_changed(&mut host);
    for (frame, x) in [(0, 0.0), (60, 10.0), (120, 20.0)] {
        engine.add_keyframe(&mut host, keyframe(frame, x)).unwrap();
    }

    host.playing = true;
    host.pose.position = DVec3::new(9.0, 1.0, 0.0);
    let first = engine.jump_to_nearest(&mut host).unwrap();
    assert!(!host.playing);
    assert!(engine.tick(&mut host, 0.5));

    host.pose.position = DVec3::new(19.0, 0.0, 0.0);
    let second = engine.jump_to_nearest(&mut host).unwrap();
    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());

    run_jump(&mut engine, &mut host);
    assert!(!engine.is_jumping());
    let last = host.views.last().unwrap();
    assert_eq!(last.position, DVec3::new(20.0, 0.0, 0.0));
    assert_eq!(last.target, Some(DVec3::new(20.0, 0.0, -5.0)));
    assert_eq!(host.frame, 120.0);
}

#[test]
fn test_jump_takes_fixed_number_of_steps() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "splat");
    engine.on_selection_changed(&mut host);
    engine.add_keyframe(&mut host, keyframe(0, 0.0)).unwrap();
    engine.add_keyframe(&mut host, keyframe(60, 10.0)).unwrap();

    host.pose.position = DVec3::new(8.0, 0.0, 0.0);
    engine.jump_to_nearest(&mut host).unwrap();
    let before = host.views.len();
    // one large tick consumes every fixed step at once
    assert!(!engine.tick(&mut host, 10.0));
    assert_eq!(host.views.len() - before, 180 + 1);
}

#[test]
fn test_frame_change_suppressed_during_jump() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "splat");
    engine.on_selection_changed(&mut host);
    engine.add_keyframe(&mut host, keyframe(0, 0.0)).unwrap();
    engine.add_keyframe(&mut host, keyframe(60, 10.0)).unwrap();

    engine.jump_to_nearest(&mut host).unwrap();
    let poses = host.poses.len();
    let views = host.views.len();
    engine.on_frame_changed(&mut host, 30.0);
    assert_eq!(host.poses.len(), poses);
    assert_eq!(host.views.len(), views);
    assert!(engine.caption().is_some());

    engine.cancel_jump();
    engine.on_frame_changed(&mut host, 30.0);
    assert_eq!(host.poses.len(), poses + 1);
}

#[test]
fn test_selection_change_cancels_jump() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "splat");
    engine.on_selection_changed(&mut host);
    engine.add_keyframe(&mut host, keyframe(0, 0.0)).unwrap();

    let token = engine.jump_to_nearest(&mut host).unwrap();
    host.select(2, "other");
    engine.on_selection_changed(&mut host);
    assert!(token.is_cancelled());
    assert!(!engine.tick(&mut host, 1.0));
}

#[test]
fn test_folder_images_follow_timeline() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "garden");
    engine.on_selection_changed(&mut host);

    let err = engine.match_image_folder(&mut host, &[]).unwrap_err();
    assert!(matches!(err, PoseTrackError::NoImageNames));

    engine.import_json(&mut host, &camera_json(3)).unwrap();
    let files: Vec<PathBuf> = ["IMG_000.PNG", "img_002.jpg", "unrelated.png"]
        .into_iter()
        .map(|n| PathBuf::from("/photos").join(n))
        .collect();
    let requests = engine.match_image_folder(&mut host, &files).unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(host.last_message().unwrap().2, "Matched 2/3 images");

    host.frame = 0.0;
    assert_eq!(engine.load_images_blocking(&mut host, requests), 2);
    assert_eq!(host.displayed.last().unwrap(), &(0, vec!["IMG_000.PNG".to_string()]));

    let keys = engine.keyframes(&host).to_vec();
    engine.on_frame_changed(&mut host, f64::from(keys[1].frame));
    // frame of the second key has no image, the first one holds
    assert_eq!(host.displayed.last().unwrap().0, 0);
    engine.on_frame_changed(&mut host, f64::from(keys[2].frame) + 5.0);
    assert_eq!(host.displayed.last().unwrap().0, keys[2].frame);

    // a simplify round trip re-resolves from the remembered matches
    engine.set_simplify(&mut host, true);
    let again = engine.take_image_requests();
    assert_eq!(again.len(), 2);
}

#[test]
fn test_stale_image_dropped_after_selection_change() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "garden");
    engine.on_selection_changed(&mut host);
    engine.import_json(&mut host, &camera_json(2)).unwrap();

    let requests = engine
        .request_base_images(&mut host, std::path::Path::new("/data/images"))
        .unwrap();
    assert_eq!(requests.len(), 2);
    let pending = engine.load_image(&requests[0]);

    host.select(2, "other");
    engine.on_selection_changed(&mut host);
    let result = pollster::block_on(pending);
    assert!(!engine.complete_image(&mut host, requests[0].ticket, result));
    assert!(host.displayed.is_empty());
}

#[test]
fn test_object_removed_drops_track_and_cache() {
    let mut host = MockHost::new();
    let mut engine = engine();
    let object = host.select(1, "garden");
    engine.on_selection_changed(&mut host);
    engine.import_json(&mut host, &camera_json(12)).unwrap();

    host.selection = None;
    engine.on_object_removed(&mut host, object);
    assert!(!engine.store().has_track(object));

    let object = host.select(3, "fresh");
    engine.on_selection_changed(&mut host);
    engine.set_simplify(&mut host, true);
    assert!(engine.store().track(object).is_empty());
}

#[test]
fn test_unrelated_removal_keeps_images() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "garden");
    engine.on_selection_changed(&mut host);
    engine.import_json(&mut host, &camera_json(3)).unwrap();
    let files = vec![PathBuf::from("/photos/img_000.png"), PathBuf::from("/photos/img_002.png")];
    let requests = engine.match_image_folder(&mut host, &files).unwrap();
    engine.load_images_blocking(&mut host, requests);

    engine.on_object_removed(&mut host, ObjectId(99));
    assert_eq!(engine.images().names().len(), 3);
    assert!(engine.images().has_loaded());

    // the remembered matches still resolve after a rebuild
    engine.set_simplify(&mut host, true);
    assert_eq!(engine.take_image_requests().len(), 2);
}

#[test]
fn test_import_sorts_non_ascii_names() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "garden");
    engine.on_selection_changed(&mut host);

    let json = r#"[
        {"img_name": "相机10", "position": [0, 0, 0]},
        {"img_name": "相机2", "position": [1, 0, 0]},
        {"img_name": "é1", "position": [2, 0, 0]}
    ]"#;
    assert_eq!(engine.import_json(&mut host, json).unwrap(), 3);
    let names: Vec<&str> = engine.keyframes(&host).iter().map(|k| k.name.as_str()).collect();
    assert_eq!(names, ["é1", "相机2", "相机10"]);
}

#[test]
fn test_pose_sets_restore_by_name() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "garden");
    engine.on_selection_changed(&mut host);
    engine.add_keyframe(&mut host, keyframe(0, 0.0)).unwrap();
    engine.add_keyframe(&mut host, keyframe(30, 3.0)).unwrap();

    let sets = engine.export_pose_sets(&host);
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].name, "garden");

    let mut fresh = self::engine();
    let restored = fresh.import_pose_sets(&mut host, &sets);
    assert_eq!(restored, 1);
    assert_eq!(fresh.keyframes(&host), engine.keyframes(&host));
    assert!(fresh.has_playback());

    let missing = PoseSet {
        name: "nowhere".to_string(),
        poses: Vec::new(),
    };
    assert_eq!(fresh.import_pose_sets(&mut host, &[missing]), 0);
}

#[test]
fn test_frame_caption_holds_previous_key() {
    let mut host = MockHost::new();
    let mut engine = engine();
    host.select(1, "garden");
    engine.on_selection_changed(&mut host);
    assert!(engine.frame_caption(&host, 0).is_none());

    engine.import_json(&mut host, &camera_json(3)).unwrap();
    let keys = engine.keyframes(&host).to_vec();

    let caption = engine.frame_caption(&host, keys[1].frame + 1).unwrap();
    assert!(caption.starts_with("Camera 1 | img_001 | pos (0.500, 1.250, -2.875)"));
    assert!(caption.contains("rot [["));
}
