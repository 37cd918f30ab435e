//! The pose engine: all keyframe state of one editor session.
//!
//! [`PoseEngine`] owns the keyframe store, the playback curves derived from
//! it, the cached raw camera records of the last import, the frame-image
//! associations and any running jump. The host drives it through explicit
//! notifications and receives camera and timeline commands back.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use pollster::FutureExt;
use posetrack_core::convention::{mat3_to_rows, raw_from_renderer};
use posetrack_core::rebuild::{self, RebuildPlan, RebuildRequest};
use posetrack_core::{
    parse_records, EngineOptions, FrameImages, ImageRequest, ImageTicket, Insertion, Interpolated,
    Keyframe, KeyframeDocument, KeyframeStore, LoadedImage, ObjectId, PosePlayback, PoseSet,
    PoseTrackError, RawCameraRecord, Result,
};

use crate::host::{CameraPose, CameraView, Host, MessageKind};
use crate::jump::{CancelToken, JumpAnimation, JumpStart};
use crate::loader::{FsImageLoader, ImageFuture, ImageLoader};

/// Raw records of the last import and the object they were installed on.
#[derive(Debug, Clone)]
struct RawCache {
    owner: ObjectId,
    records: Vec<RawCameraRecord>,
}

/// Keyframe recording, playback and transitions for one editor session.
pub struct PoseEngine {
    options: EngineOptions,
    store: KeyframeStore,
    playback: Option<PosePlayback>,
    images: FrameImages,
    pending_images: Vec<ImageRequest>,
    raw: Option<RawCache>,
    look_at_distance: f64,
    caption: Option<Interpolated>,
    jump: Option<JumpAnimation>,
    loader: Box<dyn ImageLoader>,
}

impl Default for PoseEngine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

impl PoseEngine {
    /// Creates an engine that loads images from the filesystem.
    pub fn new(options: EngineOptions) -> Self {
        Self::with_loader(options, Box::new(FsImageLoader))
    }

    /// Creates an engine with a custom image loader.
    pub fn with_loader(options: EngineOptions, loader: Box<dyn ImageLoader>) -> Self {
        Self {
            options,
            store: KeyframeStore::new(),
            playback: None,
            images: FrameImages::new(),
            pending_images: Vec::new(),
            raw: None,
            look_at_distance: 1.0,
            caption: None,
            jump: None,
            loader,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn store(&self) -> &KeyframeStore {
        &self.store
    }

    pub fn images(&self) -> &FrameImages {
        &self.images
    }

    /// Keyframes of the current selection, ordered by frame.
    pub fn keyframes(&self, host: &dyn Host) -> &[Keyframe] {
        match host.selection() {
            Some(object) => self.store.track(object),
            None => &[],
        }
    }

    /// Last interpolated pose, kept up to date even while a jump runs.
    pub fn caption(&self) -> Option<&Interpolated> {
        self.caption.as_ref()
    }

    /// Auxiliary look-at distance derived by the last rebuild.
    pub fn look_at_distance(&self) -> f64 {
        self.look_at_distance
    }

    pub fn has_playback(&self) -> bool {
        self.playback.is_some()
    }

    pub fn is_jumping(&self) -> bool {
        self.jump.is_some()
    }

    // ---- Helpers ----

    fn require_selection(host: &mut dyn Host, header: &str) -> Result<ObjectId> {
        host.selection().ok_or_else(|| {
            let err = PoseTrackError::NoSelection;
            host.show_message(MessageKind::Warning, header, &err.to_string());
            err
        })
    }

    fn report(host: &mut dyn Host, header: &str, err: PoseTrackError) -> PoseTrackError {
        log::error!("{header}: {err}");
        host.show_message(MessageKind::Error, header, &err.to_string());
        err
    }

    /// Rebuilds playback for the current selection and refreshes its marks.
    fn rebuild_playback(&mut self, host: &mut dyn Host) {
        let Some(object) = host.selection() else {
            self.playback = None;
            return;
        };
        let track = self.store.track(object);
        self.playback = PosePlayback::build(track, host.frame_count(), self.options.spline_tension);
        log::debug!(
            "playback rebuilt: {} keys, spline {}",
            track.len(),
            if self.playback.is_some() { "active" } else { "inactive" }
        );
        host.set_keyframe_marks(object, &self.store.frames(object));
    }

    fn insert(&mut self, host: &mut dyn Host, object: ObjectId, keyframe: Keyframe) -> Insertion {
        let frame = keyframe.frame;
        let insertion = self.store.add_or_replace(object, keyframe);
        log::info!("keyframe at frame {frame}: {insertion:?}");
        self.rebuild_playback(host);
        insertion
    }

    fn show_images(&self, host: &mut dyn Host, time: f64) {
        let frame = time.round().max(0.0) as u32;
        if let Some((shown, images)) = self.images.images_for(frame) {
            host.display_images(shown, images);
        }
    }

    fn emit(host: &mut dyn Host, sample: &Interpolated) {
        match sample.rotation {
            Some(rotation) => host.set_camera_view(CameraView {
                position: sample.position,
                target: Some(sample.target),
                rotation: Some(rotation),
                fx: sample.focal.fx,
                fy: sample.focal.fy,
                speed: 0.0,
            }),
            None => host.set_camera_pose(
                CameraPose {
                    position: sample.position,
                    target: sample.target,
                },
                0.0,
            ),
        }
    }

    // ---- Track editing ----

    /// Adds a keyframe to the selected track, replacing any key on the same frame.
    pub fn add_keyframe(&mut self, host: &mut dyn Host, keyframe: Keyframe) -> Result<Insertion> {
        let object = Self::require_selection(host, "Add keyframe")?;
        Ok(self.insert(host, object, keyframe))
    }

    /// Records the live camera as a keyframe at the current frame.
    pub fn capture_keyframe(&mut self, host: &mut dyn Host) -> Result<Insertion> {
        let object = Self::require_selection(host, "Add keyframe")?;
        let frame = host.current_frame().round().max(0.0) as u32;
        let pose = host.camera_pose();
        let name = format!("camera_{}", self.store.track(object).len());

        let mut keyframe = Keyframe::new(name, frame, pose.position, pose.target);
        if let Some(orientation) = host.camera_orientation() {
            keyframe = keyframe.with_raw_rotation(raw_from_renderer(orientation));
        }
        Ok(self.insert(host, object, keyframe))
    }

    /// Removes the `index`-th keyframe of the selected track.
    pub fn remove_keyframe(&mut self, host: &mut dyn Host, index: usize) -> Result<Option<Keyframe>> {
        let object = Self::require_selection(host, "Remove keyframe")?;
        let removed = self.store.remove(object, index);
        if let Some(keyframe) = &removed {
            log::info!("removed keyframe '{}' at frame {}", keyframe.name, keyframe.frame);
            self.rebuild_playback(host);
        }
        Ok(removed)
    }

    // ---- Host notifications ----

    /// The selection changed: cancel any jump and forget image state.
    pub fn on_selection_changed(&mut self, host: &mut dyn Host) {
        self.cancel_jump();
        self.images.clear();
        self.pending_images.clear();
        self.caption = None;
        if let Some(object) = host.selection() {
            self.store.ensure_track(object);
        }
        self.rebuild_playback(host);
        host.refresh_selection();
    }

    /// A scene object was destroyed: drop its track and any cache tied to it.
    ///
    /// Image state survives unless the object was selected or owns the
    /// cached raw records.
    pub fn on_object_removed(&mut self, host: &mut dyn Host, object: ObjectId) {
        if self.store.remove_track(object).is_some() {
            log::info!("dropped pose track of object {}", object.0);
        }
        let owned_raw = self.raw.as_ref().is_some_and(|raw| raw.owner == object);
        if owned_raw {
            self.raw = None;
        }

        let selected = host.selection() == Some(object);
        if selected || owned_raw {
            self.images.reset();
            self.pending_images.clear();
        }
        if selected || host.selection().is_none() {
            self.cancel_jump();
            self.caption = None;
        }
        self.rebuild_playback(host);
    }

    /// The timeline length changed.
    pub fn on_frame_count_changed(&mut self, host: &mut dyn Host) {
        self.rebuild_playback(host);
    }

    /// The displayed frame changed: evaluate and emit the camera for `time`.
    ///
    /// While a jump runs the evaluation still updates the caption, but no
    /// camera command is sent.
    pub fn on_frame_changed(&mut self, host: &mut dyn Host, time: f64) {
        self.show_images(host, time);

        let Some(playback) = &self.playback else {
            return;
        };
        let sample = playback.sample(time, host.viewport());
        self.caption = Some(sample);

        if self.jump.is_some() {
            log::debug!("frame {time}: camera owned by jump");
            return;
        }
        Self::emit(host, &sample);
    }

    // ---- Simplification ----

    /// Switches the simplification policy and rebuilds from the cached records.
    pub fn set_simplify(&mut self, host: &mut dyn Host, enabled: bool) {
        if self.options.simplify == enabled {
            return;
        }
        self.options.simplify = enabled;
        log::info!("simplification {}", if enabled { "enabled" } else { "disabled" });

        let Some(raw) = &self.raw else {
            return;
        };
        let owner = raw.owner;
        let plan = rebuild::plan(&RebuildRequest::new(&raw.records, &self.options, host.frame_count()));
        self.install(host, owner, plan, false);
    }

    /// Installs a rebuilt track and everything derived from it.
    fn install(&mut self, host: &mut dyn Host, object: ObjectId, plan: RebuildPlan, restore_view: bool) {
        let frames: BTreeSet<u32> = plan.keyframes.iter().map(|k| k.frame).collect();
        let count = plan.keyframes.len();

        self.look_at_distance = plan.look_at_distance;
        self.store.replace_track(object, plan.keyframes);
        if count > 1 {
            host.set_frame_count(plan.frame_count);
        }

        self.images.set_names(plan.image_names);
        self.pending_images = match &self.options.image_base_dir {
            Some(base) => self.images.requests_from_base(base, &self.options.image_extensions),
            None => self
                .images
                .requests_from_cache(Some(&frames), &self.options.image_extensions),
        };

        self.rebuild_playback(host);
        host.refresh_selection();

        if restore_view {
            if let Some(view) = plan.initial_view {
                host.set_camera_view(CameraView {
                    position: view.position,
                    target: Some(view.target),
                    rotation: view.rotation,
                    fx: view.focal.fx,
                    fy: view.focal.fy,
                    speed: 0.0,
                });
            }
        }

        log::info!(
            "installed {count} keyframes (step {}, {} frames, {} image requests)",
            plan.step,
            plan.frame_count,
            self.pending_images.len()
        );
    }

    // ---- Import / export ----

    /// Imports raw camera records or a keyframe document onto the selection.
    ///
    /// Returns the number of keyframes installed. Nothing changes on failure.
    pub fn import_json(&mut self, host: &mut dyn Host, json: &str) -> Result<usize> {
        let object = Self::require_selection(host, "Import keyframes")?;
        let records = parse_records(json).map_err(|e| Self::report(host, "Import failed", e))?;
        if records.is_empty() {
            return Err(Self::report(host, "Import failed", PoseTrackError::EmptyTrack));
        }

        let missing = records.iter().filter(|r| r.lacks_orientation()).count();
        if missing > 0 {
            log::warn!("{missing} cameras lack rotation and target");
            host.show_message(
                MessageKind::Warning,
                "Missing orientation",
                &format!(
                    "{missing} of {} cameras have neither rotation nor target; they will face the scene center",
                    records.len()
                ),
            );
        }

        let plan = rebuild::plan(&RebuildRequest::new(&records, &self.options, host.frame_count()));
        let count = plan.keyframes.len();
        let total = records.len();
        self.raw = Some(RawCache {
            owner: object,
            records,
        });
        self.install(host, object, plan, true);

        host.show_message(
            MessageKind::Info,
            "Keyframes imported",
            &format!("Imported {count} keyframes from {total} cameras"),
        );
        Ok(count)
    }

    /// Reads a file and imports it with [`PoseEngine::import_json`].
    pub fn load_from_path(&mut self, host: &mut dyn Host, path: impl AsRef<Path>) -> Result<usize> {
        Self::require_selection(host, "Import keyframes")?;
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| Self::report(host, "Import failed", e.into()))?;
        self.import_json(host, &json)
    }

    /// Builds the versioned export document of the selected track.
    pub fn export_document(&self, host: &mut dyn Host) -> Result<KeyframeDocument> {
        let object = Self::require_selection(host, "Export keyframes")?;
        let track = self.store.track(object);
        if track.is_empty() {
            let err = PoseTrackError::EmptyTrack;
            host.show_message(MessageKind::Warning, "Export keyframes", &err.to_string());
            return Err(err);
        }
        Ok(KeyframeDocument::from_track(
            host.object_name(object),
            track,
            host.frame_count(),
            host.frame_rate(),
            chrono::Utc::now().to_rfc3339(),
        ))
    }

    /// The export document as pretty-printed JSON.
    pub fn export_json(&self, host: &mut dyn Host) -> Result<String> {
        self.export_document(host)?.to_json_string()
    }

    /// Writes the export document into `dir`, returning the file path.
    pub fn save_to_dir(&self, host: &mut dyn Host, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let document = self.export_document(host)?;
        let path = dir.as_ref().join(document.file_name());
        let json = document.to_json_string().map_err(|e| Self::report(host, "Export failed", e))?;
        std::fs::write(&path, json).map_err(|e| Self::report(host, "Export failed", e.into()))?;
        log::info!("exported {} keyframes to {}", document.poses.len(), path.display());
        Ok(path)
    }

    /// Captures every non-empty track for a project document.
    pub fn export_pose_sets(&self, host: &dyn Host) -> Vec<PoseSet> {
        let mut tracks: Vec<_> = self.store.iter().collect();
        tracks.sort_by_key(|(object, _)| *object);
        tracks
            .into_iter()
            .map(|(object, keys)| PoseSet::from_track(host.object_name(object), keys))
            .collect()
    }

    /// Restores tracks from a project document. Returns how many were restored.
    pub fn import_pose_sets(&mut self, host: &mut dyn Host, sets: &[PoseSet]) -> usize {
        let frame_rate = host.frame_rate();
        let mut restored = 0;
        for set in sets {
            let Some(object) = host.find_object(&set.name) else {
                log::warn!("no scene object named '{}' for pose set", set.name);
                continue;
            };
            self.store.replace_track(object, set.to_keyframes(frame_rate));
            restored += 1;
        }
        if restored > 0 {
            self.rebuild_playback(host);
        }
        restored
    }

    // ---- Jumps ----

    /// Starts a transition to the keyframe nearest the live camera.
    pub fn jump_to_nearest(&mut self, host: &mut dyn Host) -> Result<CancelToken> {
        let object = Self::require_selection(host, "Jump to keyframe")?;
        let pose = host.camera_pose();
        let Some(key) = self.store.nearest(object, pose.position).cloned() else {
            let err = PoseTrackError::EmptyTrack;
            host.show_message(MessageKind::Warning, "Jump to keyframe", &err.to_string());
            return Err(err);
        };

        self.cancel_jump();
        if host.is_playing() {
            host.set_playing(false);
        }

        let start = JumpStart {
            position: pose.position,
            target: pose.target,
            orientation: host.camera_orientation(),
            frame: host.current_frame(),
        };
        let jump = JumpAnimation::new(start, &key, &self.options);
        log::info!("jumping to keyframe '{}' at frame {}", key.name, key.frame);
        let token = jump.token();
        self.jump = Some(jump);
        Ok(token)
    }

    /// Cancels the running jump, if any.
    pub fn cancel_jump(&mut self) {
        if let Some(jump) = self.jump.take() {
            jump.cancel();
            log::debug!("jump cancelled after {} steps", jump.steps_taken());
        }
    }

    /// Advances a running jump by `dt` seconds. Returns whether it is still running.
    pub fn tick(&mut self, host: &mut dyn Host, dt: f64) -> bool {
        let Some(jump) = self.jump.as_mut() else {
            return false;
        };
        let tick = jump.advance(dt);

        for sample in &tick.samples {
            host.set_current_frame(sample.frame);
            host.set_camera_view(CameraView {
                position: sample.position,
                target: Some(sample.target),
                rotation: Some(sample.rotation),
                fx: None,
                fy: None,
                speed: 0.0,
            });
        }

        let Some(end) = tick.finished else {
            return true;
        };
        self.jump = None;
        host.set_current_frame(end.frame);
        host.set_camera_view(CameraView {
            position: end.position,
            target: Some(end.target),
            rotation: Some(end.rotation),
            fx: None,
            fy: None,
            speed: 0.0,
        });
        log::info!("jump finished at frame {}", end.frame);
        false
    }

    // ---- Reference images ----

    /// Takes the image loads queued by the last rebuild.
    pub fn take_image_requests(&mut self) -> Vec<ImageRequest> {
        std::mem::take(&mut self.pending_images)
    }

    fn require_image_names(&self, host: &mut dyn Host) -> Result<()> {
        if self.images.names().is_empty() {
            let err = PoseTrackError::NoImageNames;
            log::warn!("{err}");
            host.show_message(MessageKind::Warning, "Load images", &err.to_string());
            return Err(err);
        }
        Ok(())
    }

    /// Image loads for every association under a base directory.
    pub fn request_base_images(&mut self, host: &mut dyn Host, base: &Path) -> Result<Vec<ImageRequest>> {
        self.require_image_names(host)?;
        Ok(self.images.requests_from_base(base, &self.options.image_extensions))
    }

    /// Image loads for a user-provided set of files.
    pub fn match_image_folder(&mut self, host: &mut dyn Host, files: &[PathBuf]) -> Result<Vec<ImageRequest>> {
        self.require_image_names(host)?;
        let matched = self.images.match_folder(files, &self.options.image_extensions);
        log::info!("matched {}/{} images", matched.matched, matched.total);
        host.show_message(
            MessageKind::Info,
            "Load images",
            &format!("Matched {}/{} images", matched.matched, matched.total),
        );
        Ok(matched.requests)
    }

    /// Starts one image load.
    pub fn load_image(&self, request: &ImageRequest) -> ImageFuture {
        self.loader.load(request)
    }

    /// Records a finished load and redisplays the held frame.
    ///
    /// Misses and stale completions are dropped silently.
    pub fn complete_image(&mut self, host: &mut dyn Host, ticket: ImageTicket, result: Result<LoadedImage>) -> bool {
        match result {
            Ok(image) => {
                if !self.images.complete(ticket, image) {
                    return false;
                }
                let time = host.current_frame();
                self.show_images(host, time);
                true
            }
            Err(e) => {
                log::warn!("no image for frame {}: {e}", ticket.frame);
                false
            }
        }
    }

    /// Runs `requests` to completion on the calling thread.
    pub fn load_images_blocking(&mut self, host: &mut dyn Host, requests: Vec<ImageRequest>) -> usize {
        let mut loaded = 0;
        for request in requests {
            let result = self.loader.load(&request).block_on();
            if self.complete_image(host, request.ticket, result) {
                loaded += 1;
            }
        }
        loaded
    }

    // ---- Captions ----

    /// Caption for the keyframe held at `frame`: id, image, raw position and rotation.
    pub fn frame_caption(&self, host: &dyn Host, frame: u32) -> Option<String> {
        let keys = self.keyframes(host);
        let held = keys.iter().rev().find(|k| k.frame <= frame).or_else(|| keys.first())?;

        let mut caption = format!("Camera {}", held.camera_id.as_deref().unwrap_or(&held.name));
        if let Some(image) = &held.image_name {
            let _ = write!(caption, " | {image}");
        }
        let p = held.export_position();
        let _ = write!(caption, " | pos ({:.3}, {:.3}, {:.3})", p.x, p.y, p.z);
        if let Some(rotation) = held.raw_rotation {
            let rows = mat3_to_rows(rotation)
                .iter()
                .map(|r| format!("[{:.3}, {:.3}, {:.3}]", r[0], r[1], r[2]))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = write!(caption, " | rot [{rows}]");
        }
        Some(caption)
    }
}
