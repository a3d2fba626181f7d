//! Signaling envelope and transport for offer/answer and candidate exchange
//!
//! The protocol is transport-agnostic; [`WebSocketConnector`] is the shipped
//! transport.

pub mod protocol;
mod transport;
mod websocket;

pub use protocol::{CandidateData, SdpKind, SessionDescription, SignalingMessage};
pub use transport::{SignalingConnector, SignalingTransport};
pub use websocket::{WebSocketConnector, WebSocketTransport};
