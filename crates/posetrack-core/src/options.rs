//! Configuration options for the keyframe engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunable constants for one editor session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Whether imported camera sets are thinned to `max_simplified_keyframes`.
    pub simplify: bool,

    /// Upper bound on keyframes kept when simplifying.
    pub max_simplified_keyframes: usize,

    /// Minimum number of frames between consecutive imported keyframes.
    pub min_frame_gap: u32,

    /// Timeline length assumed when the host reports zero frames.
    pub default_frame_count: u32,

    /// Wall-clock length of a jump-to-nearest-keyframe transition.
    pub jump_duration_secs: f64,

    /// Fixed integration step of the jump transition.
    pub jump_fixed_step_secs: f64,

    /// Extensions tried (in order) when resolving an image by base name.
    pub image_extensions: Vec<String>,

    /// Directory searched automatically for reference images after an import.
    pub image_base_dir: Option<PathBuf>,

    /// Spline tension; tangents are scaled by `1 - tension`, so the default
    /// of `-1` doubles them.
    pub spline_tension: f64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            simplify: false,
            max_simplified_keyframes: 10,
            min_frame_gap: 18,
            default_frame_count: 1200,
            jump_duration_secs: 3.0,
            jump_fixed_step_secs: 1.0 / 60.0,
            image_extensions: ["png", "jpg", "jpeg", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            image_base_dir: None,
            spline_tension: -1.0,
        }
    }
}

impl EngineOptions {
    /// Loads options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Serializes the options as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of fixed steps a complete jump transition takes.
    pub fn jump_step_count(&self) -> u32 {
        let steps = (self.jump_duration_secs / self.jump_fixed_step_secs).round();
        steps.max(1.0) as u32
    }
}
