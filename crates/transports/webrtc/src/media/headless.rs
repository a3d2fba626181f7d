//! Device-less media endpoint

use super::{MediaEndpoint, TrackHandle};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::{debug, info};

/// Media endpoint that grants capture handles without touching a device
///
/// Used by the command-line client and by hosts that feed audio into the
/// peer connection themselves. Constructed with `capture_available = false`
/// it refuses capture, which exercises the `MediaAccessError` path.
pub struct HeadlessMediaEndpoint {
    capture_available: bool,
    live: Mutex<HashSet<String>>,
    remote: Mutex<Vec<TrackHandle>>,
}

impl HeadlessMediaEndpoint {
    /// Create an endpoint that grants capture
    pub fn new() -> Self {
        Self::with_capture(true)
    }

    /// Create an endpoint with explicit capture availability
    pub fn with_capture(capture_available: bool) -> Self {
        Self {
            capture_available,
            live: Mutex::new(HashSet::new()),
            remote: Mutex::new(Vec::new()),
        }
    }

    /// Number of local tracks acquired and not yet released
    pub fn live_track_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Remote tracks handed over for playback
    pub fn remote_tracks(&self) -> Vec<TrackHandle> {
        self.remote.lock().clone()
    }
}

impl Default for HeadlessMediaEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEndpoint for HeadlessMediaEndpoint {
    async fn acquire_local_audio(&self) -> Result<TrackHandle> {
        if !self.capture_available {
            return Err(Error::MediaAccessError(
                "no audio capture device available".to_string(),
            ));
        }

        let track = TrackHandle::audio("headless-microphone");
        self.live.lock().insert(track.id().to_string());
        info!(track = %track, "Acquired local audio track");
        Ok(track)
    }

    fn play_remote(&self, track: TrackHandle) -> Result<()> {
        info!(track = %track, "Remote track ready for playback");
        self.remote.lock().push(track);
        Ok(())
    }

    fn release_local(&self, track: &TrackHandle) -> Result<()> {
        if self.live.lock().remove(track.id()) {
            info!(track = %track, "Released local audio track");
        } else {
            debug!(track = %track, "Release of a track that is not live");
        }
        Ok(())
    }
}
