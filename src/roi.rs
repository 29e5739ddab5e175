//! Eye and face regions derived from landmark subsets.
//!
//! The box around the selected landmarks is grown asymmetrically: the
//! top-left corner moves out by [`LEAD_MARGIN`] and the extent measured from
//! the landmark minimum grows by [`EXTENT_MARGIN`], leaving room for the
//! eyelids. The result is then clipped to the frame.

use std::ops::RangeInclusive;

use crate::error::{Error, Result};
use crate::types::{FrameSize, LandmarkSet, Point, Roi};

/// Outward shift of the top-left corner.
pub const LEAD_MARGIN: i64 = 10;
/// Growth of the width/height measured from the landmark minimum.
pub const EXTENT_MARGIN: i64 = 15;

/// Min/max extent of a set of landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkBounds {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

/// A padded rectangle before it is clipped to the frame. May be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddedRect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl PaddedRect {
    pub fn area(&self) -> i64 {
        self.width * self.height
    }
}

impl LandmarkBounds {
    /// Returns `None` for an empty slice.
    pub fn of(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let init = Self {
            min_x: first.x as i64,
            min_y: first.y as i64,
            max_x: first.x as i64,
            max_y: first.y as i64,
        };
        Some(points.iter().fold(init, |b, p| Self {
            min_x: b.min_x.min(p.x as i64),
            min_y: b.min_y.min(p.y as i64),
            max_x: b.max_x.max(p.x as i64),
            max_y: b.max_y.max(p.y as i64),
        }))
    }

    pub fn padded(&self) -> PaddedRect {
        PaddedRect {
            x: self.min_x - LEAD_MARGIN,
            y: self.min_y - LEAD_MARGIN,
            width: self.max_x - self.min_x + EXTENT_MARGIN,
            height: self.max_y - self.min_y + EXTENT_MARGIN,
        }
    }
}

/// Clip a padded rectangle to the frame.
///
/// Width and height never drop below 1 pixel, and the origin is pulled back
/// inside the frame if the landmarks lie beyond its right or bottom edge.
pub fn clip_to_frame(rect: PaddedRect, frame: FrameSize) -> Roi {
    let fw = frame.width as i64;
    let fh = frame.height as i64;
    let x = rect.x.clamp(0, fw - 1);
    let y = rect.y.clamp(0, fh - 1);
    let width = rect.width.min(fw - x).max(1);
    let height = rect.height.min(fh - y).max(1);
    Roi {
        x: x as u32,
        y: y as u32,
        width: width as u32,
        height: height as u32,
    }
}

/// Region around the landmarks in `range`, clipped to `frame`.
pub fn extract_roi(
    landmarks: &LandmarkSet,
    range: RangeInclusive<usize>,
    frame: FrameSize,
) -> Result<Roi> {
    let (start, end) = (*range.start(), *range.end());
    let bounds =
        LandmarkBounds::of(landmarks.range(range)).ok_or_else(|| Error::InvalidRange {
            start,
            end,
            available: landmarks.points().len(),
        })?;
    Ok(clip_to_frame(bounds.padded(), frame))
}
