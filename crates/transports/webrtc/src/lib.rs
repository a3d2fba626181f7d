//! Pairwise audio calls over WebRTC with WebSocket signaling
//!
//! This crate implements the session side of a two-party voice call: it
//! negotiates a peer connection through a rendezvous server, exchanges
//! session descriptions and ICE candidates in order, and tears every
//! resource down on every exit path.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  Presentation layer                                   │
//! │  ↕ CallHandle (commands) / watch<SessionState>        │
//! │  Coordinator (one task, one inbound event channel)    │
//! │  ├─ SignalingTransport (WebSocket, JSON envelopes)    │
//! │  ├─ PeerSession → PeerEngine (webrtc)                 │
//! │  └─ MediaEndpoint (capture / playback)                │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Every call attempt gets a new [`Generation`]. Events and asynchronous
//! results from an older attempt are dropped, so a reconnect can never leak
//! state from the previous connection into the new one.
//!
//! # Example
//!
//! ```
//! use voicelink_webrtc::{CallConfig, CallRole};
//!
//! let config = CallConfig {
//!     signaling_url: "wss://rooms.example.org/vc".to_string(),
//!     role: CallRole::Callee,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Async Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use voicelink_webrtc::{
//!     CallConfig, Coordinator, HeadlessMediaEndpoint, RtcPeerEngineFactory, SessionState,
//!     WebSocketConnector,
//! };
//!
//! # async fn example() -> voicelink_webrtc::Result<()> {
//! let coordinator = Coordinator::new(
//!     CallConfig::default(),
//!     Arc::new(WebSocketConnector::new()),
//!     Arc::new(RtcPeerEngineFactory::new()),
//!     Arc::new(HeadlessMediaEndpoint::new()),
//! );
//! let (call, task) = coordinator.spawn();
//!
//! call.wait_for(SessionState::Connected).await?;
//! call.shutdown().await?;
//! task.await.map_err(|e| voicelink_webrtc::Error::Other(e.into()))??;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use config::{CallConfig, CallRole, TurnServerConfig};
pub use error::{Error, Result};
pub use media::{HeadlessMediaEndpoint, MediaEndpoint, TrackHandle, TrackKind};
pub use peer::{PeerEngine, PeerEngineFactory, PeerSession, RtcPeerEngine, RtcPeerEngineFactory};
pub use session::{
    AttemptSink, CallHandle, Command, Coordinator, Generation, SessionState, TransportEvent,
};
pub use signaling::{
    CandidateData, SdpKind, SessionDescription, SignalingConnector, SignalingMessage,
    SignalingTransport, WebSocketConnector,
};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
