use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of points in the iBUG 68-point annotation scheme.
pub const NUM_LANDMARKS: usize = 68;

/// Left eye contour (36-41).
pub const LEFT_EYE: RangeInclusive<usize> = 36..=41;
/// Right eye contour (42-47).
pub const RIGHT_EYE: RangeInclusive<usize> = 42..=47;
/// Jaw contour between the cheek points (1-16).
pub const FACE_CONTOUR: RangeInclusive<usize> = 1..=16;

pub const LEFT_CHEEK: usize = 1;
pub const RIGHT_CHEEK: usize = 16;
pub const NOSE_TIP: usize = 33;

/// A 2D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// Dimensions of the frame landmarks and regions refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::EmptyFrame);
        }
        Ok(Self { width, height })
    }

    pub fn of(image: &image::GrayImage) -> Result<Self> {
        Self::new(image.width(), image.height())
    }
}

/// Axis-aligned region of interest, always inside the frame it was clipped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn origin(&self) -> Point {
        Point::new(self.x as i32, self.y as i32)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn fits_in(&self, frame: FrameSize) -> bool {
        self.x as u64 + self.width as u64 <= frame.width as u64
            && self.y as u64 + self.height as u64 <= frame.height as u64
    }

    /// Copy the region's pixels out of `frame`.
    pub fn crop(&self, frame: &image::GrayImage) -> image::GrayImage {
        image::imageops::crop_imm(frame, self.x, self.y, self.width, self.height).to_image()
    }
}

/// The 68 landmarks of one detected face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.len() != NUM_LANDMARKS {
            return Err(Error::LandmarkCount {
                expected: NUM_LANDMARKS,
                found: points.len(),
            });
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Landmarks in an inclusive index range, empty if the range is out of bounds.
    pub fn range(&self, range: RangeInclusive<usize>) -> &[Point] {
        let (start, end) = range.into_inner();
        if start > end || end >= self.points.len() {
            return &[];
        }
        &self.points[start..=end]
    }
}

impl std::ops::Index<usize> for LandmarkSet {
    type Output = Point;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}
