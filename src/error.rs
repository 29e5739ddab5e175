use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Landmark range {start}..={end} selects no landmarks of {available}")]
    InvalidRange {
        start: usize,
        end: usize,
        available: usize,
    },

    #[error("Frame has zero width or height")]
    EmptyFrame,

    #[error("No candidate centers in a {width}x{height} eye region")]
    EmptyCandidateSpace { width: u32, height: u32 },

    #[error("Expected {expected} landmarks, found {found}")]
    LandmarkCount { expected: usize, found: usize },

    #[error("{resource} '{name}' already exists (unclean shutdown?)")]
    ChannelExists { resource: &'static str, name: String },

    #[error("{op} failed: {source}")]
    Ipc {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Shared segment is {found} bytes, expected at least {expected}")]
    LayoutMismatch { expected: usize, found: usize },

    #[error("Frame id {0} is outside 0..100")]
    CorruptRecord(i64),

    #[error("Landmark detection failed: {0}")]
    Detector(String),

    #[error("Landmark model error: {0}")]
    Model(String),
}

impl Error {
    /// Capture `errno` for a failed libc call.
    pub(crate) fn last_os(op: &'static str) -> Self {
        Error::Ipc {
            op,
            source: std::io::Error::last_os_error(),
        }
    }

    /// Whether the processing loop must stop on this error.
    ///
    /// Per-frame conditions (a failed detection, a degenerate eye region)
    /// are isolated to their frame; everything touching OS resources,
    /// configuration or model files is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Detector(_)
                | Error::EmptyCandidateSpace { .. }
                | Error::InvalidRange { .. }
                | Error::LandmarkCount { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_frame_errors_are_not_fatal() {
        assert!(!Error::Detector("blurry".into()).is_fatal());
        assert!(!Error::EmptyCandidateSpace { width: 12, height: 30 }.is_fatal());
        assert!(Error::Model("truncated".into()).is_fatal());
        assert!(Error::ChannelExists {
            resource: "semaphore",
            name: "/capstone".into()
        }
        .is_fatal());
    }
}
