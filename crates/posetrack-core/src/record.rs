//! Raw camera records as they appear in imported files.
//!
//! Records come from camera-calibration exports (a bare array of cameras) or
//! from this crate's own keyframe documents (`{ "poses": [...] }`). Fields are
//! optional and loosely typed in the wild, so parsing is lenient where the
//! data can still be used and strict only about the position.

use glam::{DMat3, DVec3};
use serde::Deserialize;
use serde_json::Value;

use crate::convention::mat3_from_rows;
use crate::error::{PoseTrackError, Result};

/// A 3x3 matrix given either nested row-major or as nine flat values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MatrixInput {
    Nested(Vec<Vec<f64>>),
    Flat(Vec<f64>),
}

impl MatrixInput {
    fn len(&self) -> usize {
        match self {
            MatrixInput::Nested(rows) => rows.len(),
            MatrixInput::Flat(values) => values.len(),
        }
    }

    fn to_mat3(&self) -> Option<DMat3> {
        let rows = match self {
            MatrixInput::Nested(rows) => {
                if rows.len() != 3 || rows.iter().any(|r| r.len() != 3) {
                    return None;
                }
                [
                    [rows[0][0], rows[0][1], rows[0][2]],
                    [rows[1][0], rows[1][1], rows[1][2]],
                    [rows[2][0], rows[2][1], rows[2][2]],
                ]
            }
            MatrixInput::Flat(v) => {
                if v.len() != 9 {
                    return None;
                }
                [[v[0], v[1], v[2]], [v[3], v[4], v[5]], [v[6], v[7], v[8]]]
            }
        };
        Some(mat3_from_rows(rows))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct IntrinsicsInput {
    fx: Option<f64>,
    fy: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecordInput {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    img_name: Option<String>,
    #[serde(default)]
    position: Option<Vec<f64>>,
    #[serde(default)]
    rotation: Option<MatrixInput>,
    #[serde(default)]
    target: Option<Vec<f64>>,
    #[serde(default)]
    fx: Option<f64>,
    #[serde(default)]
    fy: Option<f64>,
    #[serde(default)]
    intrinsics: Option<IntrinsicsInput>,
    #[serde(default, rename = "K")]
    k: Option<MatrixInput>,
}

/// Empty names count as missing.
fn non_empty(name: Option<&str>) -> Option<&str> {
    name.filter(|n| !n.is_empty())
}

/// Pixel focal lengths of a record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Intrinsics {
    pub fx: Option<f64>,
    pub fy: Option<f64>,
}

/// A validated raw camera record.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCameraRecord {
    /// Numeric camera id, as text.
    pub id: Option<String>,
    pub name: Option<String>,
    pub img_name: Option<String>,
    /// Position in the raw convention.
    pub position: DVec3,
    /// Rotation in the raw convention (columns are camera axes).
    pub rotation: Option<DMat3>,
    /// Explicit look-at target.
    pub target: Option<DVec3>,
    pub intrinsics: Intrinsics,
}

impl RawCameraRecord {
    /// A minimal record with only a position.
    pub fn new(position: DVec3) -> Self {
        Self {
            id: None,
            name: None,
            img_name: None,
            position,
            rotation: None,
            target: None,
            intrinsics: Intrinsics::default(),
        }
    }

    /// Name used for sorting and image matching: `img_name`, else `name`.
    pub fn image_name(&self) -> Option<&str> {
        non_empty(self.img_name.as_deref()).or_else(|| non_empty(self.name.as_deref()))
    }

    /// Keyframe name: `name`, else `img_name`, else `camera_<index>`.
    pub fn display_name(&self, index: usize) -> String {
        non_empty(self.name.as_deref())
            .or_else(|| non_empty(self.img_name.as_deref()))
            .map_or_else(|| format!("camera_{index}"), str::to_string)
    }

    /// Caption id: the numeric id, else the name, else `#<index>`.
    pub fn camera_id(&self, index: usize) -> String {
        self.id
            .as_deref()
            .or_else(|| non_empty(self.name.as_deref()))
            .or_else(|| non_empty(self.img_name.as_deref()))
            .map_or_else(|| format!("#{index}"), str::to_string)
    }

    /// Whether the record gives no way to orient the camera.
    pub fn lacks_orientation(&self) -> bool {
        self.rotation.is_none() && self.target.is_none()
    }

    fn from_input(index: usize, input: RecordInput) -> Result<Self> {
        let position = match input.position.as_deref() {
            Some(&[x, y, z]) => DVec3::new(x, y, z),
            other => {
                return Err(PoseTrackError::InvalidPosition {
                    index,
                    len: other.map_or(0, <[f64]>::len),
                })
            }
        };

        let rotation = match &input.rotation {
            Some(m) => Some(m.to_mat3().ok_or(PoseTrackError::InvalidRotation { index, len: m.len() })?),
            None => None,
        };

        let target = match input.target.as_deref() {
            Some(&[x, y, z]) => Some(DVec3::new(x, y, z)),
            _ => None,
        };

        let id = match input.id {
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let intrinsics = extract_intrinsics(input.fx, input.fy, input.intrinsics.as_ref(), input.k.as_ref());

        Ok(Self {
            id,
            name: input.name,
            img_name: input.img_name,
            position,
            rotation,
            target,
            intrinsics,
        })
    }
}

/// Resolves focal lengths from top-level `fx`/`fy`, then `intrinsics`, then `K`.
fn extract_intrinsics(
    fx: Option<f64>,
    fy: Option<f64>,
    intrinsics: Option<&IntrinsicsInput>,
    k: Option<&MatrixInput>,
) -> Intrinsics {
    let mut fx = fx;
    let mut fy = fy;
    if fx.is_none() || fy.is_none() {
        if let Some(intr) = intrinsics {
            fx = intr.fx.or(fx);
            fy = intr.fy.or(fy);
        }
    }
    if fx.is_none() || fy.is_none() {
        if let Some(k) = k.and_then(MatrixInput::to_mat3) {
            fx = fx.or(Some(k.x_axis.x));
            fy = fy.or(Some(k.y_axis.y));
        }
    }
    Intrinsics { fx, fy }
}

/// Parses a camera file: a bare array of records or an object with a `poses` array.
///
/// Nothing is returned unless every record validates.
pub fn parse_records(json: &str) -> Result<Vec<RawCameraRecord>> {
    let value: Value = serde_json::from_str(json)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("poses") {
            Some(Value::Array(items)) => items,
            _ => return Err(PoseTrackError::UnsupportedDocument),
        },
        _ => return Err(PoseTrackError::UnsupportedDocument),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let input: RecordInput = serde_json::from_value(item)?;
            RawCameraRecord::from_input(index, input)
        })
        .collect()
}

/// Trailing number of a name (`img_0012.png` gives 12), used for natural ordering.
pub fn trailing_index(name: &str) -> Option<u64> {
    // digits are single bytes, so both ends of the run are char boundaries
    let bytes = name.as_bytes();
    let end = bytes.iter().rposition(u8::is_ascii_digit)? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);
    name[start..end].parse().ok()
}
