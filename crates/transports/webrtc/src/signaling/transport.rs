//! Signaling transport abstraction
//!
//! The transport is an ordered, reliable, message-oriented duplex channel to
//! the rendezvous server. Opening is asynchronous: `connect` returns at once
//! and the outcome arrives later as [`TransportEvent::Opened`] or
//! [`TransportEvent::Failed`] through the attempt's sink.
//!
//! [`TransportEvent::Opened`]: crate::session::TransportEvent::Opened
//! [`TransportEvent::Failed`]: crate::session::TransportEvent::Failed

use crate::session::AttemptSink;
use crate::Result;

/// Opens signaling transports
pub trait SignalingConnector: Send + Sync {
    /// Begin connecting to `url`, reporting every event through `sink`
    ///
    /// Must not block. Errors are reserved for failures that prevent the
    /// attempt from even starting (bad URL, no runtime).
    fn connect(&self, url: &str, sink: AttemptSink) -> Result<Box<dyn SignalingTransport>>;
}

/// One live signaling connection
pub trait SignalingTransport: Send + Sync {
    /// Queue a text frame for delivery
    fn send(&self, text: String) -> Result<()>;

    /// Close the connection; calling it again is a no-op
    fn close(&self) -> Result<()>;

    /// Whether the connection is currently open
    fn is_open(&self) -> bool;
}
