//! Shared fixtures for unit tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};

use image::{GrayImage, Luma};

use crate::channel::ChannelConfig;
use crate::types::{LandmarkSet, Point};

static NEXT_CHANNEL: AtomicI32 = AtomicI32::new(1);

/// Channel names no other test (or test process) uses.
pub(crate) fn unique_channel_config() -> ChannelConfig {
    let n = NEXT_CHANNEL.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id() as i32;
    ChannelConfig {
        semaphore_name: format!("/eyefinder-test-{pid}-{n}"),
        shm_key: 0x3000_0000 | ((pid & 0x7_FFFF) << 8) | (n & 0xFF),
    }
}

pub(crate) fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("eyefinder-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Bright background with one dark disk.
pub(crate) fn dark_disk(width: u32, height: u32, cx: i32, cy: i32, radius: i32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as i32 - cx;
        let dy = y as i32 - cy;
        if dx * dx + dy * dy <= radius * radius {
            Luma([30])
        } else {
            Luma([220])
        }
    })
}

/// All landmarks at the origin except the given `(index, x, y)` overrides.
pub(crate) fn landmarks_with(overrides: &[(usize, i32, i32)]) -> LandmarkSet {
    let mut points = vec![Point::default(); 68];
    for &(i, x, y) in overrides {
        points[i] = Point::new(x, y);
    }
    LandmarkSet::new(points).unwrap()
}

/// Landmark `i` at `(i, 1000 + i)`.
pub(crate) fn indexed_landmarks() -> LandmarkSet {
    LandmarkSet::new((0..68).map(|i| Point::new(i, 1000 + i)).collect()).unwrap()
}

/// Eye contour around `(cx, cy)`: corners 15 px out, lids 10 px up/down.
fn eye_contour(cx: i32, cy: i32) -> [Point; 6] {
    [
        Point::new(cx - 15, cy),
        Point::new(cx - 8, cy - 10),
        Point::new(cx + 8, cy - 10),
        Point::new(cx + 15, cy),
        Point::new(cx + 8, cy + 10),
        Point::new(cx - 8, cy + 10),
    ]
}

/// A 200x120 frontal face: two dark pupils, level cheeks, centered nose.
///
/// Returns the frame, its landmarks and the true (left, right) pupil centers.
pub(crate) fn synthetic_face() -> (GrayImage, LandmarkSet, (Point, Point)) {
    let left = Point::new(60, 50);
    let right = Point::new(140, 50);
    let frame = GrayImage::from_fn(200, 120, |x, y| {
        let inside = |c: Point| {
            let dx = x as i32 - c.x;
            let dy = y as i32 - c.y;
            dx * dx + dy * dy <= 25
        };
        if inside(left) || inside(right) {
            Luma([30])
        } else {
            Luma([210])
        }
    });

    let mut points = vec![Point::new(100, 60); 68];
    // Jaw contour 0-16 from (20, 50) round to (180, 50).
    for (i, p) in points.iter_mut().enumerate().take(17) {
        let t = i as f64 / 16.0 * std::f64::consts::PI;
        *p = Point::new(
            (100.0 - 80.0 * t.cos()).round() as i32,
            (50.0 + 60.0 * t.sin()).round() as i32,
        );
    }
    points[1] = Point::new(20, 50);
    points[16] = Point::new(180, 50);
    points[33] = Point::new(100, 80);
    points[36..42].copy_from_slice(&eye_contour(left.x, left.y));
    points[42..48].copy_from_slice(&eye_contour(right.x, right.y));

    (frame, LandmarkSet::new(points).unwrap(), (left, right))
}
