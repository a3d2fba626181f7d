//! Media endpoint boundary (local capture and remote playback)
//!
//! Device access lives outside this crate. The session only deals in
//! [`TrackHandle`]s: it acquires one local audio track per attempt, hands it to
//! exactly one peer session, and releases it on every teardown path.

mod headless;

pub use headless::HeadlessMediaEndpoint;

use crate::Result;
use async_trait::async_trait;
use std::fmt;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

impl TrackKind {
    /// Lowercase name as used by peer-connection engines
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

/// Opaque handle to a local or remote media track
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackHandle {
    id: String,
    kind: TrackKind,
    label: String,
}

impl TrackHandle {
    /// Create a handle with an explicit id
    pub fn new(id: impl Into<String>, kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
        }
    }

    /// Create an audio handle with a fresh random id
    pub fn audio(label: impl Into<String>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), TrackKind::Audio, label)
    }

    /// Track identifier (unique per endpoint)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Media kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Human readable label (device name, remote stream id, ...)
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.kind.as_str(), self.id, self.label)
    }
}

/// Local capture and remote playback, provided by the embedding application
#[async_trait]
pub trait MediaEndpoint: Send + Sync {
    /// Acquire the local microphone
    ///
    /// Fails with `MediaAccessError` when capture is denied or unavailable.
    async fn acquire_local_audio(&self) -> Result<TrackHandle>;

    /// Start playing a track received from the remote peer
    fn play_remote(&self, track: TrackHandle) -> Result<()>;

    /// Stop and release a previously acquired local track
    fn release_local(&self, track: &TrackHandle) -> Result<()>;
}
