//! Cross-process publication of the latest [`FrameRecord`].
//!
//! # Wire layout
//!
//! The segment holds [`CHANNEL_WORDS`] native-endian C `long` values:
//! word 0 is the frame id (0..=99), words 1..=30 the [`FeatureVector`].
//! There is no version tag. Changing the layout means choosing new channel
//! names so old consumers cannot misread it.
//!
//! # Protocol
//!
//! Writer and readers take the named semaphore (count 1) around every access.
//! The writer overwrites the whole record under the lock, releases it, then
//! advances the frame id modulo 100. Nothing stops a reader from skipping the
//! lock; such a reader may see a torn record.
//!
//! Acquisition has no timeout. A process that dies while holding the lock
//! leaves it taken and every later acquisition blocks forever; recovery is
//! [`SharedChannel::remove_stale`] with all parties stopped.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::{FeatureVector, Word, FEATURE_LEN};
use crate::ipc::{NamedSemaphore, SharedSegment};

pub const DEFAULT_SEMAPHORE_NAME: &str = "/capstone";
pub const DEFAULT_SHM_KEY: i32 = 123456;

/// Frame ids cycle through `0..FRAME_ID_MODULUS`.
pub const FRAME_ID_MODULUS: u8 = 100;
/// Words in the shared record: frame id + feature vector.
pub const CHANNEL_WORDS: usize = 1 + FEATURE_LEN;
/// Size of the shared segment in bytes.
pub const CHANNEL_BYTES: usize = CHANNEL_WORDS * std::mem::size_of::<Word>();

/// Names both sides of the channel must agree on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// POSIX semaphore name, e.g. `/capstone`.
    pub semaphore_name: String,
    /// System V IPC key of the shared segment.
    pub shm_key: i32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            semaphore_name: DEFAULT_SEMAPHORE_NAME.to_string(),
            shm_key: DEFAULT_SHM_KEY,
        }
    }
}

/// Sequence id of a published record, always in `0..100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct FrameId(u8);

impl FrameId {
    pub const ZERO: FrameId = FrameId(0);

    pub fn new(id: u8) -> Result<Self> {
        if id >= FRAME_ID_MODULUS {
            return Err(Error::CorruptRecord(id as i64));
        }
        Ok(Self(id))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn next(self) -> Self {
        Self((self.0 + 1) % FRAME_ID_MODULUS)
    }
}

impl TryFrom<u8> for FrameId {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        Self::new(id)
    }
}

impl From<FrameId> for u8 {
    fn from(id: FrameId) -> u8 {
        id.0
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// One published snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub frame_id: FrameId,
    pub features: FeatureVector,
}

impl FrameRecord {
    pub fn to_words(&self) -> [Word; CHANNEL_WORDS] {
        let mut words = [0 as Word; CHANNEL_WORDS];
        words[0] = self.frame_id.value() as Word;
        words[1..].copy_from_slice(self.features.as_slice());
        words
    }

    pub fn from_words(words: &[Word; CHANNEL_WORDS]) -> Result<Self> {
        let raw_id = words[0];
        let frame_id = u8::try_from(raw_id)
            .ok()
            .and_then(|id| FrameId::new(id).ok())
            .ok_or(Error::CorruptRecord(raw_id as i64))?;
        let mut values = [0 as Word; FEATURE_LEN];
        values.copy_from_slice(&words[1..]);
        Ok(Self {
            frame_id,
            features: FeatureVector::from_words(values),
        })
    }
}

/// Holds the channel semaphore; released on drop.
pub struct ChannelLock<'a> {
    semaphore: &'a NamedSemaphore,
    segment: &'a SharedSegment,
}

impl ChannelLock<'_> {
    pub fn read(&self) -> Result<FrameRecord> {
        let mut words = [0 as Word; CHANNEL_WORDS];
        // SAFETY: the semaphore is held for the lifetime of `self`.
        unsafe { self.segment.read_words(&mut words) };
        FrameRecord::from_words(&words)
    }
}

impl Drop for ChannelLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.semaphore.post() {
            tracing::error!(error = %e, "failed to release channel semaphore");
        }
    }
}

fn acquire<'a>(
    semaphore: &'a NamedSemaphore,
    segment: &'a SharedSegment,
) -> Result<ChannelLock<'a>> {
    semaphore.wait()?;
    Ok(ChannelLock { semaphore, segment })
}

/// The producer's side of the channel. Owns and removes the OS objects.
#[derive(Debug)]
pub struct SharedChannel {
    // Field order matters for drop: detach the segment before closing the lock.
    segment: SharedSegment,
    semaphore: NamedSemaphore,
    config: ChannelConfig,
}

impl SharedChannel {
    /// Create the semaphore and segment, failing if either already exists.
    ///
    /// If the segment cannot be created the semaphore is unlinked again
    /// before the error is returned.
    pub fn create(config: &ChannelConfig) -> Result<Self> {
        let semaphore = NamedSemaphore::create_exclusive(&config.semaphore_name)?;
        let segment = SharedSegment::create_exclusive(config.shm_key, CHANNEL_BYTES)?;
        tracing::info!(
            semaphore = %config.semaphore_name,
            shm_key = config.shm_key,
            bytes = segment.len(),
            "shared channel created"
        );
        Ok(Self {
            segment,
            semaphore,
            config: config.clone(),
        })
    }

    /// Remove objects left behind by a producer that did not shut down cleanly.
    ///
    /// Returns whether anything was removed. Only safe when no producer or
    /// reader is running.
    pub fn remove_stale(config: &ChannelConfig) -> Result<bool> {
        let sem = NamedSemaphore::unlink(&config.semaphore_name)?;
        let shm = SharedSegment::remove(config.shm_key)?;
        if sem || shm {
            tracing::warn!(
                semaphore_removed = sem,
                segment_removed = shm,
                "removed stale channel objects"
            );
        }
        Ok(sem || shm)
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Take the channel lock, blocking without timeout.
    pub fn lock(&self) -> Result<ChannelLock<'_>> {
        acquire(&self.semaphore, &self.segment)
    }

    /// Overwrite the shared record under the lock.
    pub fn write(&self, record: &FrameRecord) -> Result<()> {
        let words = record.to_words();
        let _lock = self.lock()?;
        // SAFETY: we hold the semaphore and created the segment.
        unsafe { self.segment.write_words(&words) };
        Ok(())
    }

    pub fn read(&self) -> Result<FrameRecord> {
        self.lock()?.read()
    }
}

impl Drop for SharedChannel {
    fn drop(&mut self) {
        tracing::info!(
            semaphore = %self.config.semaphore_name,
            shm_key = self.config.shm_key,
            "releasing shared channel"
        );
    }
}

/// A consumer attached to a channel created by another process.
#[derive(Debug)]
pub struct ChannelReader {
    segment: SharedSegment,
    semaphore: NamedSemaphore,
}

impl ChannelReader {
    pub fn attach(config: &ChannelConfig) -> Result<Self> {
        let semaphore = NamedSemaphore::open(&config.semaphore_name)?;
        let segment = SharedSegment::attach_existing(config.shm_key, CHANNEL_BYTES)?;
        Ok(Self { segment, semaphore })
    }

    pub fn lock(&self) -> Result<ChannelLock<'_>> {
        acquire(&self.semaphore, &self.segment)
    }

    /// Snapshot the current record following the lock protocol.
    pub fn read(&self) -> Result<FrameRecord> {
        self.lock()?.read()
    }
}

/// Stamps feature vectors with the rolling frame id and writes them out.
#[derive(Debug)]
pub struct Publisher {
    channel: SharedChannel,
    next_id: FrameId,
}

impl Publisher {
    pub fn new(channel: SharedChannel) -> Self {
        Self::with_start_id(channel, FrameId::ZERO)
    }

    pub fn with_start_id(channel: SharedChannel, start: FrameId) -> Self {
        Self {
            channel,
            next_id: start,
        }
    }

    pub fn next_id(&self) -> FrameId {
        self.next_id
    }

    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    /// Publish `features` and advance the frame id. Returns what was written.
    pub fn publish(&mut self, features: FeatureVector) -> Result<FrameRecord> {
        let record = FrameRecord {
            frame_id: self.next_id,
            features,
        };
        self.channel.write(&record)?;
        self.next_id = self.next_id.next();
        tracing::debug!(frame_id = %record.frame_id, "published frame");
        Ok(record)
    }

    pub fn into_channel(self) -> SharedChannel {
        self.channel
    }
}
