//! Pupil center localization by gradient voting.
//!
//! Every candidate center is scored by how well the image gradients around
//! it point along the displacement from the candidate, weighted by how dark
//! the (blurred) pixel is:
//!
//! ```text
//! objective(r, c) = Σ (dot(unit(d), g(i, j)))² · (255 − blur(i, j))
//! ```
//!
//! where `d` is the displacement from `(r, c)` to `(i, j)` and `g` the unit
//! intensity gradient. The iris/sclera boundary produces gradients that are
//! radial with respect to the pupil center, so the center maximizes the sum.
//!
//! This is the brute-force variant of the Timm & Barth (2011) eye-center
//! heuristic; no training data is needed.

use image::{GrayImage, ImageBuffer, Luma};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Point;

/// Configuration for the gradient-voting search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PupilConfig {
    /// Minimum distance (pixels) between a candidate and every region border.
    pub border: u32,
    /// Gaussian sigma for the intensity weight map. Matches a 5x5 kernel.
    pub blur_sigma: f32,
    /// Split candidate rows across the rayon pool.
    pub parallel: bool,
}

impl Default for PupilConfig {
    fn default() -> Self {
        Self {
            border: 10,
            blur_sigma: 1.1,
            parallel: true,
        }
    }
}

/// A pixel with a non-zero gradient.
#[derive(Debug, Clone, Copy)]
struct EdgeSample {
    row: f64,
    col: f64,
    gx: f64,
    gy: f64,
    weight: f64,
}

/// Unit gradients and inverted-intensity weights over one eye region.
#[derive(Debug, Clone)]
pub struct GradientField {
    width: u32,
    height: u32,
    /// Row-major, pixels with zero gradient left out. They contribute an
    /// exact 0.0 to every objective, so skipping them keeps sums bit-identical.
    samples: Vec<EdgeSample>,
}

impl GradientField {
    pub fn compute(eye: &GrayImage, blur_sigma: f32) -> Self {
        let (w, h) = eye.dimensions();

        let gx = imageproc::gradients::horizontal_sobel(eye);
        let gy = imageproc::gradients::vertical_sobel(eye);

        let mut f = ImageBuffer::<Luma<f32>, Vec<f32>>::new(w, h);
        for (dst, src) in f.pixels_mut().zip(eye.pixels()) {
            *dst = Luma([src[0] as f32]);
        }
        let blurred = imageproc::filter::gaussian_blur_f32(&f, blur_sigma);

        let mut samples = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let gxv = gx.get_pixel(x, y)[0] as f64;
                let gyv = gy.get_pixel(x, y)[0] as f64;
                let mag = (gxv * gxv + gyv * gyv).sqrt();
                if mag == 0.0 {
                    continue;
                }
                samples.push(EdgeSample {
                    row: y as f64,
                    col: x as f64,
                    gx: gxv / mag,
                    gy: gyv / mag,
                    weight: 255.0 - blurred.get_pixel(x, y)[0] as f64,
                });
            }
        }

        Self {
            width: w,
            height: h,
            samples,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels with a non-zero gradient.
    pub fn edge_count(&self) -> usize {
        self.samples.len()
    }

    /// Score of candidate center `(row, col)`.
    pub fn objective(&self, row: u32, col: u32) -> f64 {
        let r = row as f64;
        let c = col as f64;
        let mut sum = 0.0;
        for s in &self.samples {
            let dy = s.row - r;
            let dx = s.col - c;
            if dx == 0.0 && dy == 0.0 {
                continue;
            }
            let mag = (dx * dx + dy * dy).sqrt();
            let dot = (dx / mag) * s.gx + (dy / mag) * s.gy;
            sum += dot * dot * s.weight;
        }
        sum
    }

    /// First strict maximum along one candidate row.
    fn best_in_row(&self, row: u32, cols: std::ops::Range<u32>) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for col in cols {
            let score = self.objective(row, col);
            if best.map_or(true, |b| score > b.score) {
                best = Some(Candidate { row, col, score });
            }
        }
        best
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    row: u32,
    col: u32,
    score: f64,
}

/// Locates the pupil center inside an eye region.
#[derive(Debug, Clone)]
pub struct PupilLocalizer {
    config: PupilConfig,
}

impl PupilLocalizer {
    pub fn new(config: PupilConfig) -> Result<Self> {
        if !(config.blur_sigma.is_finite() && config.blur_sigma > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "pupil blur_sigma must be positive, got {}",
                config.blur_sigma
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PupilConfig {
        &self.config
    }

    /// Estimate the pupil center, relative to the region's top-left corner.
    ///
    /// Ties keep the first candidate in row-major order, also when rows are
    /// searched in parallel.
    pub fn locate(&self, eye: &GrayImage) -> Result<Point> {
        let (w, h) = eye.dimensions();
        let border = self.config.border;
        if w <= border.saturating_mul(2) || h <= border.saturating_mul(2) {
            return Err(Error::EmptyCandidateSpace {
                width: w,
                height: h,
            });
        }

        let field = GradientField::compute(eye, self.config.blur_sigma);
        let rows = border..h - border;
        let cols = border..w - border;

        let row_best: Vec<Option<Candidate>> = if self.config.parallel {
            rows.into_par_iter()
                .map(|r| field.best_in_row(r, cols.clone()))
                .collect()
        } else {
            rows.map(|r| field.best_in_row(r, cols.clone())).collect()
        };

        let mut best: Option<Candidate> = None;
        for cand in row_best.into_iter().flatten() {
            if best.map_or(true, |b| cand.score > b.score) {
                best = Some(cand);
            }
        }

        let best = best.ok_or(Error::EmptyCandidateSpace {
            width: w,
            height: h,
        })?;
        tracing::trace!(
            x = best.col,
            y = best.row,
            score = best.score,
            edges = field.edge_count(),
            "pupil candidate"
        );
        Ok(Point::new(best.col as i32, best.row as i32))
    }
}
