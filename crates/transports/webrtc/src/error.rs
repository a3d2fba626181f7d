//! Error types for the call session

/// Result type alias using the session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating or tearing down a call
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local capture unavailable or denied
    #[error("Media access error: {0}")]
    MediaAccessError(String),

    /// Malformed or incompatible session description
    #[error("SDP negotiation error: {0}")]
    NegotiationError(String),

    /// Malformed ICE candidate
    #[error("ICE candidate error: {0}")]
    IceError(String),

    /// Peer-connection engine could not be created or driven
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Signaling transport failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Operation on a peer session that was already torn down
    #[error("Peer session closed: {0}")]
    SessionClosed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// One or more release steps failed during teardown
    #[error("Teardown incomplete: {} step(s) failed", .0.len())]
    Teardown(Vec<Error>),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error ends the current call attempt
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::MediaAccessError(_)
                | Error::NegotiationError(_)
                | Error::PeerConnectionError(_)
                | Error::TransportError(_)
        )
    }

    /// Check if this error came from description negotiation
    pub fn is_negotiation_error(&self) -> bool {
        matches!(self, Error::NegotiationError(_))
    }

    /// Reclassify as a negotiation failure, keeping closed-session errors intact
    pub fn into_negotiation(self) -> Error {
        match self {
            Error::NegotiationError(_) | Error::SessionClosed(_) => self,
            other => Error::NegotiationError(other.to_string()),
        }
    }

    /// Reclassify as a candidate failure, keeping closed-session errors intact
    pub fn into_ice(self) -> Error {
        match self {
            Error::IceError(_) | Error::SessionClosed(_) => self,
            other => Error::IceError(other.to_string()),
        }
    }
}
