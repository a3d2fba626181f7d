//! Media endpoint that counts acquisitions and releases

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use voicelink_webrtc::{Error, MediaEndpoint, Result, TrackHandle};

#[derive(Default)]
pub struct MockMedia {
    deny_capture: AtomicBool,
    fail_release: AtomicBool,
    acquired: AtomicUsize,
    released: Mutex<Vec<String>>,
    played: Mutex<Vec<TrackHandle>>,
}

impl MockMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_capture(&self, deny: bool) {
        self.deny_capture.store(deny, Ordering::SeqCst);
    }

    pub fn fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Track ids passed to `release_local`, in order
    pub fn released(&self) -> Vec<String> {
        self.released.lock().clone()
    }

    pub fn played(&self) -> Vec<TrackHandle> {
        self.played.lock().clone()
    }
}

#[async_trait]
impl MediaEndpoint for MockMedia {
    async fn acquire_local_audio(&self) -> Result<TrackHandle> {
        if self.deny_capture.load(Ordering::SeqCst) {
            return Err(Error::MediaAccessError("permission denied".to_string()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(TrackHandle::audio("mock-microphone"))
    }

    fn play_remote(&self, track: TrackHandle) -> Result<()> {
        self.played.lock().push(track);
        Ok(())
    }

    fn release_local(&self, track: &TrackHandle) -> Result<()> {
        self.released.lock().push(track.id().to_string());
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(Error::MediaAccessError("device busy".to_string()));
        }
        Ok(())
    }
}
