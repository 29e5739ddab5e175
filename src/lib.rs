//! # eyefinder
//!
//! Per-frame eye-gaze features published to other processes over shared
//! memory.
//!
//! This crate provides:
//! - **Eye regions**: padded, frame-clipped boxes around the 68-point eye landmarks
//! - **Pupil localization**: gradient-voting search for the darkest radially
//!   symmetric spot in an eye region (Timm & Barth, 2011)
//! - **Head angles**: yaw-like `theta` and roll-like `alpha` from cheek and nose points
//! - **Publication**: a fixed 31-word record in a System V segment, guarded by a
//!   POSIX named semaphore
//!
//! ## Pipeline
//!
//! 1. A [`FrameSource`] supplies a grayscale frame
//! 2. A [`LandmarkDetector`] returns the 68 landmarks of the face, if any
//! 3. [`extract_roi`] derives both eye regions
//! 4. [`PupilLocalizer`] finds each pupil; [`FaceAngles`] estimates head pose
//! 5. [`FeatureVector::assemble`] packs 30 values in wire order
//! 6. [`Publisher`] writes `{frame_id, vector}` under the channel semaphore
//!
//! ## Quick Start
//!
//! ```rust
//! use eyefinder::{FaceAngles, FeatureVector, LandmarkSet, Point};
//!
//! let landmarks = LandmarkSet::new(vec![Point::new(10, 10); 68]).unwrap();
//! let angles = FaceAngles::from_landmarks(&landmarks);
//! let vector = FeatureVector::assemble(
//!     &landmarks,
//!     Point::new(12, 11),
//!     Point::new(30, 11),
//!     angles,
//! );
//! assert_eq!(vector.as_slice().len(), 30);
//! ```
//!
//! ## Reading the channel
//!
//! ```no_run
//! use eyefinder::{ChannelConfig, ChannelReader};
//!
//! let reader = ChannelReader::attach(&ChannelConfig::default())?;
//! let record = reader.read()?;
//! println!("frame {} pupil {:?}", record.frame_id, record.features.left_pupil());
//! # Ok::<(), eyefinder::Error>(())
//! ```

mod angles;
mod channel;
mod config;
mod error;
mod extractor;
mod features;
mod ipc;
mod pupil;
mod roi;
mod source;
mod types;

#[cfg(test)]
mod test_utils;

pub use angles::{FaceAngles, NOSE_TO_FACE_RATIO};
pub use channel::{
    ChannelConfig, ChannelLock, ChannelReader, FrameId, FrameRecord, Publisher, SharedChannel,
    CHANNEL_BYTES, CHANNEL_WORDS, DEFAULT_SEMAPHORE_NAME, DEFAULT_SHM_KEY, FRAME_ID_MODULUS,
};
pub use config::{Config, FrameConfig};
pub use error::{Error, Result};
pub use extractor::{run, run_until, BadFrame, FeatureExtractor, FrameOutcome, RunStats};
pub use features::{FeatureVector, Word, FEATURE_LEN};
pub use pupil::{GradientField, PupilConfig, PupilLocalizer};
pub use roi::{clip_to_frame, extract_roi, LandmarkBounds, PaddedRect, EXTENT_MARGIN, LEAD_MARGIN};
pub use source::{
    preprocess, FrameSource, LandmarkDetector, ReplayEntry, ReplayFrames, ReplayLandmarks,
    ReplaySession,
};
pub use types::{
    FrameSize, LandmarkSet, Point, Roi, FACE_CONTOUR, LEFT_CHEEK, LEFT_EYE, NOSE_TIP,
    NUM_LANDMARKS, RIGHT_CHEEK, RIGHT_EYE,
};
