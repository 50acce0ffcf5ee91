//! Static track data resolved for each session

use serde::{Deserialize, Deserializer, Serialize};

/// Descriptive metadata for a track layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackInfo {
    pub name: String,
    pub city: String,
    pub country: String,
    pub description: String,
    pub length: String,
    #[serde(deserialize_with = "number_or_string")]
    pub pitboxes: String,
    pub run: String,
    pub tags: Vec<String>,
    pub width: String,
}

/// Geometry needed to project world positions onto the track map image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMap {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub scale_factor: f32,
    pub offset_x: f32,
    pub offset_z: f32,
    pub drawing_size: f32,
}

impl Default for TrackMap {
    fn default() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            margin: 0.0,
            scale_factor: 1.0,
            offset_x: 0.0,
            offset_z: 0.0,
            drawing_size: 10.0,
        }
    }
}

impl TrackMap {
    /// Project a world-space x/z position to map pixel coordinates.
    pub fn project(&self, x: f32, z: f32) -> (f32, f32) {
        let scale = if self.scale_factor == 0.0 { 1.0 } else { self.scale_factor };
        ((x + self.offset_x) / scale, (z + self.offset_z) / scale)
    }
}

// Content files write some counts as numbers and others as strings.
fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}
