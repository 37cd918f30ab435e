//! Frame-to-reference-image association.
//!
//! Keyframes remember the base name of the photograph they were calibrated
//! from. This module tracks those names per frame, decides which files to try
//! for each one, and holds the images that have finished loading. Loading
//! itself happens elsewhere; every request carries a generation number so
//! completions that arrive after the associations changed are dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// A reference image that finished loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    /// File name of the image.
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Identifies one outstanding load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageTicket {
    pub frame: u32,
    pub generation: u64,
}

/// A load to perform: try `candidates` in order, first existing file wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub ticket: ImageTicket,
    /// Expected base name.
    pub name: String,
    pub candidates: Vec<PathBuf>,
}

/// Result of matching a user-provided folder against the expected names.
#[derive(Debug, Clone, Default)]
pub struct FolderMatch {
    pub requests: Vec<ImageRequest>,
    pub matched: usize,
    pub total: usize,
}

/// Per-frame image names and loaded images for the current selection.
#[derive(Debug, Default)]
pub struct FrameImages {
    names: BTreeMap<u32, String>,
    loaded: BTreeMap<u32, Vec<LoadedImage>>,
    // lowercase file name (with and without extension) -> matched file
    path_cache: HashMap<String, PathBuf>,
    generation: u64,
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) if i > 0 && !name[i + 1..].contains('/') => &name[..i],
        _ => name,
    }
}

impl FrameImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation. Requests from older generations are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Expected image names by frame.
    pub fn names(&self) -> &BTreeMap<u32, String> {
        &self.names
    }

    /// Expected image name of a frame.
    pub fn image_name(&self, frame: u32) -> Option<&str> {
        self.names.get(&frame).map(String::as_str)
    }

    /// Frames that currently have at least one loaded image.
    pub fn loaded_frames(&self) -> impl Iterator<Item = u32> + '_ {
        self.loaded.keys().copied()
    }

    /// Whether any image is loaded.
    pub fn has_loaded(&self) -> bool {
        !self.loaded.is_empty()
    }

    /// Replaces the expected names and drops every loaded image.
    pub fn set_names(&mut self, names: BTreeMap<u32, String>) {
        self.names = names;
        self.invalidate();
    }

    /// Drops names and loaded images. The matched-file cache survives.
    pub fn clear(&mut self) {
        self.names.clear();
        self.invalidate();
    }

    /// Drops everything, including the matched-file cache.
    pub fn reset(&mut self) {
        self.clear();
        self.path_cache.clear();
    }

    fn invalidate(&mut self) {
        self.loaded.clear();
        self.generation += 1;
    }

    fn request(&self, frame: u32, name: &str, candidates: Vec<PathBuf>) -> ImageRequest {
        ImageRequest {
            ticket: ImageTicket {
                frame,
                generation: self.generation,
            },
            name: name.to_string(),
            candidates,
        }
    }

    /// Requests for every named frame under a fixed base directory.
    ///
    /// Candidates are `base/name` and then `base/name.<ext>` per extension.
    pub fn requests_from_base(&mut self, base: &Path, extensions: &[String]) -> Vec<ImageRequest> {
        self.invalidate();
        self.names
            .iter()
            .map(|(&frame, name)| {
                let mut candidates = vec![base.join(name)];
                candidates.extend(extensions.iter().map(|ext| base.join(format!("{name}.{ext}"))));
                self.request(frame, name, candidates)
            })
            .collect()
    }

    /// Matches user-provided files against the expected names.
    ///
    /// Tries an exact file name (or file name without extension), then the
    /// name plus each extension, then a case-insensitive substring. Matches
    /// are remembered for [`FrameImages::requests_from_cache`].
    pub fn match_folder(&mut self, files: &[PathBuf], extensions: &[String]) -> FolderMatch {
        self.invalidate();

        // insertion order matters for the substring fallback
        let mut keys: Vec<(String, &PathBuf)> = Vec::with_capacity(files.len() * 2);
        let mut exact: HashMap<String, &PathBuf> = HashMap::new();
        for path in files {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            exact.insert(file_name.to_string(), path);
            keys.push((file_name.to_string(), path));
            let bare = strip_extension(file_name);
            if !exact.contains_key(bare) {
                exact.insert(bare.to_string(), path);
                keys.push((bare.to_string(), path));
            }
        }

        let mut result = FolderMatch {
            total: self.names.len(),
            ..FolderMatch::default()
        };
        let mut cache_updates = Vec::new();

        for (&frame, name) in &self.names {
            if name.is_empty() {
                continue;
            }
            let lower = name.to_lowercase();
            let found = exact
                .get(name.as_str())
                .copied()
                .or_else(|| extensions.iter().find_map(|ext| exact.get(&format!("{name}.{ext}")).copied()))
                .or_else(|| {
                    keys.iter()
                        .find(|(k, _)| k.to_lowercase().contains(&lower))
                        .map(|(_, p)| *p)
                });

            if let Some(path) = found {
                result.matched += 1;
                result.requests.push(self.request(frame, name, vec![path.clone()]));
                cache_updates.push(path.clone());
            }
        }

        for path in cache_updates {
            if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
                let lower = file_name.to_lowercase();
                self.path_cache
                    .insert(strip_extension(&lower).to_string(), path.clone());
                self.path_cache.insert(lower, path);
            }
        }

        result
    }

    /// Requests for named frames whose files were matched earlier.
    ///
    /// When `allowed` is given, only those frames are requested.
    pub fn requests_from_cache(&mut self, allowed: Option<&BTreeSet<u32>>, extensions: &[String]) -> Vec<ImageRequest> {
        self.invalidate();
        let mut requests = Vec::new();
        for (&frame, name) in &self.names {
            if allowed.is_some_and(|a| !a.contains(&frame)) {
                continue;
            }
            let base = name.to_lowercase();
            let cached = std::iter::once(base.clone())
                .chain(extensions.iter().map(|ext| format!("{base}.{ext}")))
                .find_map(|key| self.path_cache.get(&key));
            if let Some(path) = cached {
                requests.push(self.request(frame, name, vec![path.clone()]));
            }
        }
        requests
    }

    /// Records a finished load. Returns `false` for stale tickets.
    pub fn complete(&mut self, ticket: ImageTicket, image: LoadedImage) -> bool {
        if ticket.generation != self.generation {
            log::debug!("dropping stale image '{}' for frame {}", image.name, ticket.frame);
            return false;
        }
        self.loaded.entry(ticket.frame).or_default().push(image);
        true
    }

    /// Frame whose images should show at `frame`.
    ///
    /// The greatest loaded frame not after `frame`; the first loaded frame
    /// when `frame` precedes them all; `None` when nothing is loaded.
    pub fn display_frame(&self, frame: u32) -> Option<u32> {
        self.loaded
            .range(..=frame)
            .next_back()
            .or_else(|| self.loaded.iter().next())
            .map(|(&f, _)| f)
    }

    /// Images to show at `frame`, with the frame they belong to.
    pub fn images_for(&self, frame: u32) -> Option<(u32, &[LoadedImage])> {
        let shown = self.display_frame(frame)?;
        let images = self.loaded.get(&shown)?;
        (!images.is_empty()).then_some((shown, images.as_slice()))
    }
}
