//! Head-pose angles from three landmarks.
//!
//! `theta` approximates rotation about the vertical axis, assuming the nose
//! protrudes a quarter of the face width. `alpha` is the side-to-side tilt of
//! the line between the cheek contour points. Both are in degrees and keep
//! full precision here; narrowing to integers happens when the feature
//! vector is assembled.

use serde::{Deserialize, Serialize};

use crate::types::{LandmarkSet, Point, LEFT_CHEEK, NOSE_TIP, RIGHT_CHEEK};

/// Nose length as a fraction of face width.
pub const NOSE_TO_FACE_RATIO: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceAngles {
    /// Yaw-like angle; positive when the nose is right of the cheek midpoint.
    pub theta: f64,
    /// Roll-like angle; positive when the right cheek is lower (larger y).
    pub alpha: f64,
}

impl FaceAngles {
    pub fn estimate(left_cheek: Point, right_cheek: Point, nose: Point) -> Self {
        let face_width = right_cheek.x as f64 - left_cheek.x as f64;
        let nose_length = NOSE_TO_FACE_RATIO * face_width;

        let true_center_x = left_cheek.x as f64 + face_width / 2.0;
        let offset = nose.x as f64 - true_center_x;

        let theta = if offset == 0.0 {
            0.0
        } else {
            let angle = (nose_length / offset.abs()).atan();
            let theta = 90.0 - angle.to_degrees();
            if offset < 0.0 {
                -theta
            } else {
                theta
            }
        };

        let vertical_offset = right_cheek.y as f64 - left_cheek.y as f64;
        let alpha = if vertical_offset == 0.0 {
            0.0
        } else {
            let alpha = (vertical_offset.abs() / face_width).atan().to_degrees();
            if vertical_offset < 0.0 {
                -alpha
            } else {
                alpha
            }
        };

        Self { theta, alpha }
    }

    pub fn from_landmarks(landmarks: &LandmarkSet) -> Self {
        Self::estimate(
            landmarks[LEFT_CHEEK],
            landmarks[RIGHT_CHEEK],
            landmarks[NOSE_TIP],
        )
    }
}
