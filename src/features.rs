//! The fixed-order feature vector published for each frame.
//!
//! Layout (indices into the 30 values):
//!
//! | index  | content                                   |
//! |--------|-------------------------------------------|
//! | 0-11   | left eye landmarks 36-41, `x, y` each     |
//! | 12-23  | right eye landmarks 42-47, `x, y` each    |
//! | 24, 25 | left pupil `x, y` (frame coordinates)     |
//! | 26, 27 | right pupil `x, y` (frame coordinates)    |
//! | 28     | theta, truncated toward zero              |
//! | 29     | alpha, truncated toward zero              |
//!
//! Consumers index this layout directly, so it must not be reordered.

use serde::{Deserialize, Serialize};

use crate::angles::FaceAngles;
use crate::types::{LandmarkSet, Point, LEFT_EYE, RIGHT_EYE};

/// One value of the wire layout: the platform C `long`.
pub type Word = libc::c_long;

/// Number of values in a feature vector.
pub const FEATURE_LEN: usize = 30;

pub const LEFT_EYE_OFFSET: usize = 0;
pub const RIGHT_EYE_OFFSET: usize = 12;
pub const LEFT_PUPIL_OFFSET: usize = 24;
pub const RIGHT_PUPIL_OFFSET: usize = 26;
pub const THETA_OFFSET: usize = 28;
pub const ALPHA_OFFSET: usize = 29;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: [Word; FEATURE_LEN],
}

impl FeatureVector {
    pub fn from_words(values: [Word; FEATURE_LEN]) -> Self {
        Self { values }
    }

    /// Build the vector for one face.
    ///
    /// Pupils must already be in frame coordinates. Angles are narrowed
    /// with `as`, which truncates toward zero.
    pub fn assemble(
        landmarks: &LandmarkSet,
        left_pupil: Point,
        right_pupil: Point,
        angles: FaceAngles,
    ) -> Self {
        let mut values = [0 as Word; FEATURE_LEN];
        let eyes = landmarks
            .range(LEFT_EYE)
            .iter()
            .chain(landmarks.range(RIGHT_EYE));
        for (i, p) in eyes.enumerate() {
            values[2 * i] = p.x as Word;
            values[2 * i + 1] = p.y as Word;
        }
        values[LEFT_PUPIL_OFFSET] = left_pupil.x as Word;
        values[LEFT_PUPIL_OFFSET + 1] = left_pupil.y as Word;
        values[RIGHT_PUPIL_OFFSET] = right_pupil.x as Word;
        values[RIGHT_PUPIL_OFFSET + 1] = right_pupil.y as Word;
        values[THETA_OFFSET] = angles.theta as Word;
        values[ALPHA_OFFSET] = angles.alpha as Word;
        Self { values }
    }

    pub fn as_slice(&self) -> &[Word] {
        &self.values
    }

    pub fn words(&self) -> &[Word; FEATURE_LEN] {
        &self.values
    }

    pub fn len(&self) -> usize {
        FEATURE_LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    fn point_at(&self, offset: usize) -> Point {
        Point::new(self.values[offset] as i32, self.values[offset + 1] as i32)
    }

    pub fn left_eye(&self) -> Vec<Point> {
        (0..6).map(|i| self.point_at(LEFT_EYE_OFFSET + 2 * i)).collect()
    }

    pub fn right_eye(&self) -> Vec<Point> {
        (0..6).map(|i| self.point_at(RIGHT_EYE_OFFSET + 2 * i)).collect()
    }

    pub fn left_pupil(&self) -> Point {
        self.point_at(LEFT_PUPIL_OFFSET)
    }

    pub fn right_pupil(&self) -> Point {
        self.point_at(RIGHT_PUPIL_OFFSET)
    }

    pub fn theta(&self) -> Word {
        self.values[THETA_OFFSET]
    }

    pub fn alpha(&self) -> Word {
        self.values[ALPHA_OFFSET]
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            values: [0; FEATURE_LEN],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::indexed_landmarks;

    #[test]
    fn assembles_thirty_values_in_wire_order() {
        let landmarks = indexed_landmarks();
        let v = FeatureVector::assemble(
            &landmarks,
            Point::new(501, 502),
            Point::new(601, 602),
            FaceAngles {
                theta: 12.9,
                alpha: -3.7,
            },
        );
        assert_eq!(v.as_slice().len(), FEATURE_LEN);
        // fixture point i is (i, 1000 + i)
        assert_eq!(&v.as_slice()[..4], &[36, 1036, 37, 1037]);
        assert_eq!(&v.as_slice()[10..14], &[41, 1041, 42, 1042]);
        assert_eq!(&v.as_slice()[22..24], &[47, 1047]);
        assert_eq!(&v.as_slice()[24..28], &[501, 502, 601, 602]);
        assert_eq!(v.theta(), 12);
        assert_eq!(v.alpha(), -3);
    }

    #[test]
    fn accessors_mirror_layout() {
        let landmarks = indexed_landmarks();
        let v = FeatureVector::assemble(
            &landmarks,
            Point::new(7, 8),
            Point::new(9, 10),
            FaceAngles::default(),
        );
        assert_eq!(v.left_eye()[0], Point::new(36, 1036));
        assert_eq!(v.right_eye()[5], Point::new(47, 1047));
        assert_eq!(v.left_pupil(), Point::new(7, 8));
        assert_eq!(v.right_pupil(), Point::new(9, 10));
    }
}
