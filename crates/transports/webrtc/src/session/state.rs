//! Call session state

use std::fmt;

/// Lifecycle state of a call, as observed by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Nothing started yet
    #[default]
    Initializing,
    /// Attempt in progress, waiting for signaling and negotiation
    Connecting,
    /// Offer/answer exchange completed over an open transport
    Connected,
    /// Teardown in progress
    Disconnecting,
    /// Attempt ended normally or transport closed
    Disconnected,
    /// Attempt failed
    Error,
}

impl SessionState {
    /// All states, in lifecycle order
    pub const ALL: [SessionState; 6] = [
        SessionState::Initializing,
        SessionState::Connecting,
        SessionState::Connected,
        SessionState::Disconnecting,
        SessionState::Disconnected,
        SessionState::Error,
    ];

    /// Stable lowercase key
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
            SessionState::Disconnected => "disconnected",
            SessionState::Error => "error",
        }
    }

    /// Name shown to users
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::Initializing => "Initializing",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
            SessionState::Disconnecting => "Disconnecting",
            SessionState::Disconnected => "Disconnected",
            SessionState::Error => "Error",
        }
    }

    /// Whether no attempt is in progress in this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Error)
    }

    /// Whether moving to `next` is a legal transition
    ///
    /// Staying in the same state is not a transition.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (*self, next) {
            (from, to) if from == to => false,
            (_, Error) | (_, Disconnecting) => true,
            (Initializing | Disconnected | Error, Connecting) => true,
            (Connecting, Connected) => true,
            (Connecting | Connected | Disconnecting, Disconnected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
