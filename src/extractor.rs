//! Per-frame feature extraction and the processing loop.

use std::sync::atomic::{AtomicBool, Ordering};

use image::{GrayImage, ImageBuffer, Luma};

use crate::angles::FaceAngles;
use crate::channel::Publisher;
use crate::config::{Config, FrameConfig};
use crate::error::Result;
use crate::features::FeatureVector;
use crate::pupil::PupilLocalizer;
use crate::roi::extract_roi;
use crate::source::{FrameSource, LandmarkDetector};
use crate::types::{FrameSize, LandmarkSet, Roi, FACE_CONTOUR, LEFT_EYE, RIGHT_EYE};

/// Why a frame produced no feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadFrame {
    /// The detector found no face.
    NoFace,
    /// An eye region is too small to hold any pupil candidate.
    DegenerateEye(Roi),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Features(FeatureVector),
    Bad(BadFrame),
}

/// Turns one frame plus its landmarks into a [`FeatureVector`].
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    localizer: PupilLocalizer,
    face_blur_ratio: f32,
}

impl FeatureExtractor {
    pub fn new(localizer: PupilLocalizer, frame: &FrameConfig) -> Self {
        Self {
            localizer,
            face_blur_ratio: frame.face_blur_ratio,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            PupilLocalizer::new(config.pupil.clone())?,
            &config.frame,
        ))
    }

    pub fn process(&self, frame: &GrayImage, landmarks: Option<&LandmarkSet>) -> Result<FrameOutcome> {
        match landmarks {
            Some(face) => self.extract(frame, face),
            None => Ok(FrameOutcome::Bad(BadFrame::NoFace)),
        }
    }

    pub fn extract(&self, frame: &GrayImage, landmarks: &LandmarkSet) -> Result<FrameOutcome> {
        let size = FrameSize::of(frame)?;
        let left = extract_roi(landmarks, LEFT_EYE, size)?;
        let right = extract_roi(landmarks, RIGHT_EYE, size)?;

        let margin = self.localizer.config().border.saturating_mul(2);
        for roi in [left, right] {
            if roi.width <= margin || roi.height <= margin {
                return Ok(FrameOutcome::Bad(BadFrame::DegenerateEye(roi)));
            }
        }

        let smoothed;
        let search = if self.face_blur_ratio > 0.0 {
            let face = extract_roi(landmarks, FACE_CONTOUR, size)?;
            smoothed = blur_frame(frame, self.face_blur_ratio * face.width as f32);
            &smoothed
        } else {
            frame
        };

        let left_pupil = self.localizer.locate(&left.crop(search))? + left.origin();
        let right_pupil = self.localizer.locate(&right.crop(search))? + right.origin();
        let angles = FaceAngles::from_landmarks(landmarks);

        Ok(FrameOutcome::Features(FeatureVector::assemble(
            landmarks,
            left_pupil,
            right_pupil,
            angles,
        )))
    }
}

fn blur_frame(frame: &GrayImage, sigma: f32) -> GrayImage {
    if !(sigma > 0.0) {
        return frame.clone();
    }
    let (w, h) = frame.dimensions();
    let mut f = ImageBuffer::<Luma<f32>, Vec<f32>>::new(w, h);
    for (dst, src) in f.pixels_mut().zip(frame.pixels()) {
        *dst = Luma([src[0] as f32]);
    }
    let blurred = imageproc::filter::gaussian_blur_f32(&f, sigma);
    let mut out = GrayImage::new(w, h);
    for (dst, src) in out.pixels_mut().zip(blurred.pixels()) {
        *dst = Luma([src[0].round().clamp(0.0, 255.0) as u8]);
    }
    out
}

/// Counters for one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: usize,
    pub published: usize,
    pub bad_frames: usize,
    pub failed_frames: usize,
    /// Set when the run ended on a shutdown request.
    pub interrupted: bool,
}

/// Process frames until the source is exhausted.
///
/// Bad frames leave the channel untouched, so consumers keep seeing the last
/// published record. Per-frame errors are logged and skipped; fatal errors
/// end the run and are returned.
pub fn run<S, D>(
    source: &mut S,
    detector: &mut D,
    extractor: &FeatureExtractor,
    publisher: &mut Publisher,
) -> Result<RunStats>
where
    S: FrameSource,
    D: LandmarkDetector,
{
    run_until(source, detector, extractor, publisher, &AtomicBool::new(false))
}

/// Like [`run`], but stops before the next frame once `shutdown` is set.
///
/// A source that fails before yielding any frame is unusable and its error
/// is returned. Later source failures end the run normally.
pub fn run_until<S, D>(
    source: &mut S,
    detector: &mut D,
    extractor: &FeatureExtractor,
    publisher: &mut Publisher,
    shutdown: &AtomicBool,
) -> Result<RunStats>
where
    S: FrameSource,
    D: LandmarkDetector,
{
    let mut stats = RunStats::default();
    loop {
        if shutdown.load(Ordering::Acquire) {
            tracing::info!(frame = stats.frames, "shutdown requested");
            stats.interrupted = true;
            break;
        }
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) if stats.frames == 0 => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "frame source failed, stopping");
                break;
            }
        };
        stats.frames += 1;

        let outcome = detector
            .detect(&frame)
            .and_then(|face| extractor.process(&frame, face.as_ref()));
        match outcome {
            Ok(FrameOutcome::Features(features)) => {
                publisher.publish(features)?;
                stats.published += 1;
            }
            Ok(FrameOutcome::Bad(reason)) => {
                tracing::debug!(frame = stats.frames, ?reason, "bad frame, channel left unchanged");
                stats.bad_frames += 1;
            }
            Err(e) if !e.is_fatal() => {
                tracing::warn!(frame = stats.frames, error = %e, "frame skipped");
                stats.failed_frames += 1;
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!(
        frames = stats.frames,
        published = stats.published,
        bad = stats.bad_frames,
        failed = stats.failed_frames,
        "processing finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelReader, FrameId, SharedChannel};
    use crate::error::Error;
    use crate::pupil::PupilConfig;
    use crate::test_utils::{synthetic_face, unique_channel_config};
    use crate::types::Point;

    fn extractor(face_blur_ratio: f32) -> FeatureExtractor {
        let localizer = PupilLocalizer::new(PupilConfig::default()).unwrap();
        FeatureExtractor::new(
            localizer,
            &FrameConfig {
                scale: 1.0,
                face_blur_ratio,
            },
        )
    }

    #[test]
    fn extracts_pupils_in_frame_coordinates() {
        let (frame, landmarks, pupils) = synthetic_face();
        let outcome = extractor(0.0).extract(&frame, &landmarks).unwrap();
        let FrameOutcome::Features(v) = outcome else {
            panic!("expected features, got {outcome:?}");
        };
        assert_eq!(v.as_slice().len(), 30);
        let (l, r) = (v.left_pupil(), v.right_pupil());
        assert!((l.x - pupils.0.x).abs() <= 2 && (l.y - pupils.0.y).abs() <= 2, "{l:?}");
        assert!((r.x - pupils.1.x).abs() <= 2 && (r.y - pupils.1.y).abs() <= 2, "{r:?}");
        assert_eq!(v.left_eye()[0], landmarks[36]);
        assert_eq!(v.right_eye()[5], landmarks[47]);
        assert_eq!((v.theta(), v.alpha()), (0, 0));
    }

    #[test]
    fn face_blur_keeps_pupils_close() {
        let (frame, landmarks, pupils) = synthetic_face();
        let FrameOutcome::Features(v) = extractor(0.005).extract(&frame, &landmarks).unwrap() else {
            panic!("expected features");
        };
        assert!((v.left_pupil().x - pupils.0.x).abs() <= 2);
        assert!((v.right_pupil().y - pupils.1.y).abs() <= 2);
    }

    #[test]
    fn missing_face_is_a_bad_frame() {
        let (frame, _, _) = synthetic_face();
        assert_eq!(
            extractor(0.0).process(&frame, None).unwrap(),
            FrameOutcome::Bad(BadFrame::NoFace)
        );
    }

    #[test]
    fn tiny_eye_region_is_a_bad_frame() {
        let frame = GrayImage::from_pixel(200, 120, Luma([200]));
        let points: Vec<Point> = (0..68).map(|_| Point::new(60, 60)).collect();
        let landmarks = LandmarkSet::new(points).unwrap();
        let outcome = extractor(0.0).extract(&frame, &landmarks).unwrap();
        assert!(matches!(outcome, FrameOutcome::Bad(BadFrame::DegenerateEye(_))));
    }

    struct Frames(Vec<GrayImage>);

    impl FrameSource for Frames {
        fn next_frame(&mut self) -> Result<Option<GrayImage>> {
            Ok(if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            })
        }
    }

    struct Scripted(Vec<Result<Option<LandmarkSet>>>);

    impl LandmarkDetector for Scripted {
        fn detect(&mut self, _frame: &GrayImage) -> Result<Option<LandmarkSet>> {
            self.0.remove(0)
        }
    }

    #[test]
    fn run_publishes_good_frames_and_keeps_stale_record() {
        let (frame, landmarks, _) = synthetic_face();
        let config = unique_channel_config();
        let mut publisher = Publisher::new(SharedChannel::create(&config).unwrap());
        let reader = ChannelReader::attach(&config).unwrap();

        let mut source = Frames(vec![frame.clone(), frame.clone(), frame.clone(), frame]);
        let mut detector = Scripted(vec![
            Ok(Some(landmarks.clone())),
            Ok(Some(landmarks.clone())),
            Err(Error::Detector("glare".into())),
            Ok(None),
        ]);
        let stats = run(&mut source, &mut detector, &extractor(0.0), &mut publisher).unwrap();

        assert_eq!(
            stats,
            RunStats {
                frames: 4,
                published: 2,
                bad_frames: 1,
                failed_frames: 1,
                interrupted: false,
            }
        );
        let record = reader.read().unwrap();
        assert_eq!(record.frame_id, FrameId::new(1).unwrap());
        assert_eq!(record.features.left_eye()[0], landmarks[36]);
        assert_eq!(publisher.next_id(), FrameId::new(2).unwrap());
    }

    #[test]
    fn run_stops_on_fatal_detector_error() {
        let (frame, landmarks, _) = synthetic_face();
        let config = unique_channel_config();
        let mut publisher = Publisher::new(SharedChannel::create(&config).unwrap());

        let mut source = Frames(vec![frame.clone(), frame.clone(), frame]);
        let mut detector = Scripted(vec![
            Ok(Some(landmarks)),
            Err(Error::Model("weights corrupted".into())),
            Ok(None),
        ]);
        let err = run(&mut source, &mut detector, &extractor(0.0), &mut publisher).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert_eq!(publisher.next_id(), FrameId::new(1).unwrap());
    }

    struct Broken;

    impl FrameSource for Broken {
        fn next_frame(&mut self) -> Result<Option<GrayImage>> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "camera unplugged",
            )))
        }
    }

    #[test]
    fn unusable_source_fails_the_run() {
        let config = unique_channel_config();
        let mut publisher = Publisher::new(SharedChannel::create(&config).unwrap());
        let mut detector = Scripted(vec![]);
        let err = run(&mut Broken, &mut detector, &extractor(0.0), &mut publisher).unwrap_err();
        assert!(matches!(err, Error::Io(_)), "{err}");
        assert_eq!(publisher.next_id(), FrameId::ZERO);
    }

    /// Raises the shutdown flag while handing out its first face.
    struct StopAfterFirst<'a> {
        face: LandmarkSet,
        shutdown: &'a AtomicBool,
    }

    impl LandmarkDetector for StopAfterFirst<'_> {
        fn detect(&mut self, _frame: &GrayImage) -> Result<Option<LandmarkSet>> {
            self.shutdown.store(true, Ordering::Release);
            Ok(Some(self.face.clone()))
        }
    }

    #[test]
    fn shutdown_flag_stops_run_and_channel_is_released() {
        let (frame, landmarks, _) = synthetic_face();
        let config = unique_channel_config();
        let mut publisher = Publisher::new(SharedChannel::create(&config).unwrap());
        let shutdown = AtomicBool::new(false);

        let mut source = Frames(vec![frame.clone(), frame.clone(), frame]);
        let mut detector = StopAfterFirst {
            face: landmarks,
            shutdown: &shutdown,
        };
        let stats = run_until(
            &mut source,
            &mut detector,
            &extractor(0.0),
            &mut publisher,
            &shutdown,
        )
        .unwrap();

        assert_eq!((stats.frames, stats.published), (1, 1));
        assert!(stats.interrupted);
        assert_eq!(source.0.len(), 2);

        drop(publisher);
        assert!(ChannelReader::attach(&config).is_err());
        assert!(!SharedChannel::remove_stale(&config).unwrap());
    }

    #[test]
    fn huge_border_marks_eyes_degenerate() {
        let (frame, landmarks, _) = synthetic_face();
        let localizer = PupilLocalizer::new(PupilConfig {
            border: u32::MAX,
            ..PupilConfig::default()
        })
        .unwrap();
        let extractor = FeatureExtractor::new(localizer, &FrameConfig::default());
        let outcome = extractor.extract(&frame, &landmarks).unwrap();
        assert!(matches!(outcome, FrameOutcome::Bad(BadFrame::DegenerateEye(_))));
    }
}
