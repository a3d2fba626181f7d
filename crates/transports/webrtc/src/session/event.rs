//! Events posted to the coordinator's inbound channel
//!
//! Every transport callback, engine callback and spawned negotiation task
//! reports through an [`AttemptSink`], which stamps the event with the
//! generation of the attempt that produced it.

use crate::media::TrackHandle;
use crate::signaling::{CandidateData, SessionDescription};
use crate::{Error, Result};
use std::fmt;
use tokio::sync::mpsc;
use tracing::trace;

/// Attempt token, strictly increasing per coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    /// Token for the attempt after this one
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }

    /// Raw counter value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Frame payload received from the signaling transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Text frame
    Text(String),
    /// Binary frame, expected to carry UTF-8 JSON
    Binary(Vec<u8>),
}

impl Payload {
    /// Decode the payload as UTF-8 text
    pub fn into_text(self) -> Result<String> {
        match self {
            Payload::Text(text) => Ok(text),
            Payload::Binary(bytes) => String::from_utf8(bytes).map_err(|e| {
                Error::SerializationError(format!("Binary frame is not UTF-8: {}", e))
            }),
        }
    }
}

/// Lifecycle and message events of the signaling transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established
    Opened,
    /// Message received
    Message(Payload),
    /// Connection closed by either side
    Closed {
        /// Close code (1005 when none was given)
        code: u16,
        /// Close reason
        reason: String,
    },
    /// Connection failed
    Failed(String),
}

/// Events raised by the peer-connection engine
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// Locally gathered ICE candidate
    LocalCandidate(CandidateData),
    /// Media track received from the remote participant
    RemoteTrack(TrackHandle),
    /// Engine wants a new offer/answer exchange
    NegotiationNeeded,
}

/// Result of a spawned offer/answer creation
#[derive(Debug)]
pub enum NegotiationOutcome {
    /// Local offer created and applied, or `None` when it was superseded
    /// by a remote offer before being applied
    OfferCreated(Result<Option<SessionDescription>>),
    /// Local answer created and applied
    AnswerCreated(Result<SessionDescription>),
}

/// Event payload without its generation stamp
#[derive(Debug)]
pub enum EventKind {
    /// From the signaling transport
    Transport(TransportEvent),
    /// From the peer-connection engine
    Peer(PeerEvent),
    /// From a spawned negotiation task
    Negotiation(NegotiationOutcome),
}

/// Event as it travels through the coordinator's inbound channel
#[derive(Debug)]
pub struct CoordinatorEvent {
    /// Attempt that produced the event
    pub generation: Generation,
    /// What happened
    pub kind: EventKind,
}

/// Posting side of the inbound channel, bound to one attempt
#[derive(Debug, Clone)]
pub struct AttemptSink {
    generation: Generation,
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl AttemptSink {
    /// Bind a sink to `generation`
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<CoordinatorEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation stamped on everything posted through this sink
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Post a transport event
    pub fn transport(&self, event: TransportEvent) {
        self.post(EventKind::Transport(event));
    }

    /// Post an engine event
    pub fn peer(&self, event: PeerEvent) {
        self.post(EventKind::Peer(event));
    }

    /// Post the result of a negotiation task
    pub fn negotiation(&self, outcome: NegotiationOutcome) {
        self.post(EventKind::Negotiation(outcome));
    }

    fn post(&self, kind: EventKind) {
        let event = CoordinatorEvent {
            generation: self.generation,
            kind,
        };
        if self.tx.send(event).is_err() {
            // Coordinator already gone
            trace!(generation = %self.generation, "Dropping event, coordinator gone");
        }
    }
}
