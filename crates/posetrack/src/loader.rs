//! Asynchronous reference-image resolution.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use posetrack_core::{ImageRequest, LoadedImage, PoseTrackError, Result};

/// Future resolving one [`ImageRequest`].
pub type ImageFuture = Pin<Box<dyn Future<Output = Result<LoadedImage>>>>;

/// Resolves image requests into loaded images.
pub trait ImageLoader {
    /// Starts loading. The first candidate that resolves wins.
    fn load(&self, request: &ImageRequest) -> ImageFuture;
}

/// Loads images from the local filesystem, reading only their header.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsImageLoader;

fn probe(path: &Path) -> Result<LoadedImage> {
    let (width, height) =
        image::image_dimensions(path).map_err(|e| PoseTrackError::ImageDecode(format!("{}: {e}", path.display())))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(LoadedImage {
        name,
        path: path.to_path_buf(),
        width,
        height,
    })
}

impl ImageLoader for FsImageLoader {
    fn load(&self, request: &ImageRequest) -> ImageFuture {
        let name = request.name.clone();
        let candidates = request.candidates.clone();
        Box::pin(async move {
            for path in candidates.iter().filter(|p| p.is_file()) {
                match probe(path) {
                    Ok(image) => return Ok(image),
                    Err(e) => log::debug!("skipping image candidate: {e}"),
                }
            }
            Err(PoseTrackError::ImageNotFound(name))
        })
    }
}
