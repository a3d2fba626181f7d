//! Peer session: one engine instance for one call attempt

use super::PeerEngine;
use crate::media::TrackHandle;
use crate::signaling::{CandidateData, SessionDescription};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Owns one peer-connection engine and the local tracks added to it
///
/// Created at attempt start, closed on teardown and never reused. Every
/// operation after [`close`](PeerSession::close) fails with `SessionClosed`,
/// so a negotiation task still holding the session cannot mutate it.
pub struct PeerSession {
    session_id: String,
    engine: Arc<dyn PeerEngine>,
    local_tracks: Mutex<Vec<TrackHandle>>,
    closed: AtomicBool,
}

impl PeerSession {
    /// Wrap a freshly created engine
    pub fn new(engine: Arc<dyn PeerEngine>) -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        debug!(session_id = %session_id, "Created peer session");

        Self {
            session_id,
            engine,
            local_tracks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Unique identifier of this session
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the session was closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Local tracks added so far
    pub fn local_tracks(&self) -> Vec<TrackHandle> {
        self.local_tracks.lock().clone()
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::SessionClosed(format!(
                "{} on closed peer session {}",
                operation, self.session_id
            )));
        }
        Ok(())
    }

    /// Attach a local track to the engine
    pub async fn add_local_track(&self, track: TrackHandle) -> Result<()> {
        self.ensure_open("add_local_track")?;

        self.engine
            .add_local_track(&track)
            .await
            .map_err(Error::into_negotiation)?;

        debug!(session_id = %self.session_id, track = %track, "Added local track");
        self.local_tracks.lock().push(track);
        Ok(())
    }

    /// Create a local offer
    pub async fn create_offer(&self) -> Result<SessionDescription> {
        self.ensure_open("create_offer")?;
        self.engine
            .create_offer()
            .await
            .map_err(Error::into_negotiation)
    }

    /// Create a local answer to the applied remote offer
    pub async fn create_answer(&self) -> Result<SessionDescription> {
        self.ensure_open("create_answer")?;
        self.engine
            .create_answer()
            .await
            .map_err(Error::into_negotiation)
    }

    /// Apply a local description
    pub async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.ensure_open("set_local_description")?;
        desc.validate()?;
        self.engine
            .set_local_description(desc)
            .await
            .map_err(Error::into_negotiation)
    }

    /// Apply a remote description
    pub async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.ensure_open("set_remote_description")?;
        desc.validate()?;

        debug!(
            session_id = %self.session_id,
            kind = desc.kind.as_str(),
            "Applying remote description"
        );
        self.engine
            .set_remote_description(desc)
            .await
            .map_err(Error::into_negotiation)
    }

    /// Add a candidate received from the remote participant
    pub async fn add_remote_candidate(&self, candidate: CandidateData) -> Result<()> {
        self.ensure_open("add_remote_candidate")?;
        candidate.validate()?;
        self.engine
            .add_ice_candidate(candidate)
            .await
            .map_err(Error::into_ice)
    }

    /// Release the engine; only the first call reaches it
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!(session_id = %self.session_id, "Closing peer session");
        self.local_tracks.lock().clear();
        self.engine
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close engine: {}", e)))
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
