//! Call session: state machine, events and control handle

mod coordinator;
mod event;
mod handle;
mod state;

pub use coordinator::Coordinator;
pub use event::{
    AttemptSink, CoordinatorEvent, EventKind, Generation, NegotiationOutcome, Payload, PeerEvent,
    TransportEvent,
};
pub use handle::{CallHandle, Command};
pub use state::SessionState;
