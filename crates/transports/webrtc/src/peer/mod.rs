//! Peer session and the peer-connection engine boundary

mod engine;
mod session;

pub use engine::{RtcPeerEngine, RtcPeerEngineFactory};
pub use session::PeerSession;

use crate::config::CallConfig;
use crate::media::TrackHandle;
use crate::session::AttemptSink;
use crate::signaling::{CandidateData, SessionDescription};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Offer/answer and candidate primitives of a peer-connection engine
///
/// Engines report local candidates, remote tracks and negotiation-needed
/// through the [`AttemptSink`] they were created with.
#[async_trait]
pub trait PeerEngine: Send + Sync {
    /// Attach a local media track
    async fn add_local_track(&self, track: &TrackHandle) -> Result<()>;

    /// Create an offer without applying it
    async fn create_offer(&self) -> Result<SessionDescription>;

    /// Create an answer to the applied remote offer without applying it
    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply a local description
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Apply a remote description
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Add a candidate received from the remote participant
    async fn add_ice_candidate(&self, candidate: CandidateData) -> Result<()>;

    /// Release the engine
    async fn close(&self) -> Result<()>;
}

/// Builds one engine per call attempt
#[async_trait]
pub trait PeerEngineFactory: Send + Sync {
    /// Create an engine configured with the call's ICE servers
    async fn create(&self, config: &CallConfig, sink: AttemptSink) -> Result<Arc<dyn PeerEngine>>;
}
