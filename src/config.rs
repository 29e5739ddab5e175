use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::channel::ChannelConfig;
use crate::error::Result;
use crate::pupil::PupilConfig;

/// Top-level configuration, read from JSON. Missing fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub channel: ChannelConfig,
    pub pupil: PupilConfig,
    pub frame: FrameConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Resize factor applied to every frame before landmarking.
    pub scale: f32,
    /// Pre-blur sigma for eye search, as a fraction of the face contour
    /// width. `0.0` disables the pre-blur.
    ///
    /// The default `0.005` gives sigma 0.8 for a 160 px wide face.
    pub face_blur_ratio: f32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            scale: 0.5,
            face_blur_ratio: 0.005,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}
