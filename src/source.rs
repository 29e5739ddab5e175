//! Frame and landmark collaborators.
//!
//! Capture and the landmark model live outside this crate; the processing
//! loop only sees the [`FrameSource`] and [`LandmarkDetector`] traits. A
//! recorded session can be replayed through both with [`ReplaySession`].

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{LandmarkSet, Point};

/// Supplies grayscale frames. `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<GrayImage>>;
}

/// Finds the face of interest in a frame.
///
/// Returns `Ok(None)` when no face is visible. Errors classified as fatal by
/// [`Error::is_fatal`] stop processing; others only drop the current frame.
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &GrayImage) -> Result<Option<LandmarkSet>>;
}

/// Convert to grayscale and rescale by `scale` (1.0 keeps the size).
pub fn preprocess(image: &DynamicImage, scale: f32) -> Result<GrayImage> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "frame scale must be positive, got {scale}"
        )));
    }
    let gray = image.to_luma8();
    if scale == 1.0 {
        return Ok(gray);
    }
    let width = ((gray.width() as f32 * scale).round() as u32).max(1);
    let height = ((gray.height() as f32 * scale).round() as u32).max(1);
    Ok(image::imageops::resize(&gray, width, height, FilterType::Triangle))
}

/// One line of a replay manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayEntry {
    /// Image path, relative to the manifest's directory unless absolute.
    pub image: PathBuf,
    /// 68 `[x, y]` pairs in preprocessed frame coordinates, or `null` when
    /// no face was found.
    #[serde(default)]
    pub landmarks: Option<Vec<(i32, i32)>>,
}

/// A recorded session: frames on disk plus the landmarks found in each.
///
/// The manifest is JSON lines, one [`ReplayEntry`] per frame. The whole
/// manifest is validated up front so a corrupt recording fails at startup
/// rather than mid-stream.
#[derive(Debug, Clone)]
pub struct ReplaySession {
    frames: Vec<PathBuf>,
    landmarks: Vec<Option<LandmarkSet>>,
    scale: f32,
}

impl ReplaySession {
    pub fn load<P: AsRef<Path>>(manifest: P, scale: f32) -> Result<Self> {
        let manifest = manifest.as_ref();
        let base = manifest.parent().unwrap_or_else(|| Path::new("."));
        let reader = BufReader::new(File::open(manifest)?);

        let mut frames = Vec::new();
        let mut landmarks = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: ReplayEntry = serde_json::from_str(&line)?;
            let set = entry
                .landmarks
                .map(|pts| {
                    LandmarkSet::new(pts.into_iter().map(|(x, y)| Point::new(x, y)).collect())
                })
                .transpose()
                .map_err(|e| Error::Model(format!("{}:{}: {e}", manifest.display(), lineno + 1)))?;
            frames.push(base.join(entry.image));
            landmarks.push(set);
        }

        tracing::info!(
            manifest = %manifest.display(),
            frames = frames.len(),
            "loaded replay session"
        );
        Ok(Self {
            frames,
            landmarks,
            scale,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Split into a frame source and a detector that advance in lockstep.
    pub fn split(self) -> (ReplayFrames, ReplayLandmarks) {
        (
            ReplayFrames {
                paths: self.frames.into(),
                scale: self.scale,
            },
            ReplayLandmarks {
                pending: self.landmarks.into(),
            },
        )
    }
}

/// Frames of a [`ReplaySession`], decoded and preprocessed on demand.
#[derive(Debug)]
pub struct ReplayFrames {
    paths: VecDeque<PathBuf>,
    scale: f32,
}

impl FrameSource for ReplayFrames {
    fn next_frame(&mut self) -> Result<Option<GrayImage>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)?;
        preprocess(&image, self.scale).map(Some)
    }
}

/// Recorded landmarks of a [`ReplaySession`], one entry per frame.
#[derive(Debug)]
pub struct ReplayLandmarks {
    pending: VecDeque<Option<LandmarkSet>>,
}

impl LandmarkDetector for ReplayLandmarks {
    fn detect(&mut self, _frame: &GrayImage) -> Result<Option<LandmarkSet>> {
        self.pending
            .pop_front()
            .ok_or_else(|| Error::Detector("replay has no landmarks left".into()))
    }
}
