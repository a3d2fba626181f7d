//! Signaling envelope exchanged through the rendezvous server
//!
//! Every message is a single JSON object `{"type": ..., "data": ...}` where
//! `data` carries the engine-native description or candidate object:
//!
//! ```json
//! {"type": "offer",  "data": {"type": "offer",  "sdp": "v=0\r\n..."}}
//! {"type": "answer", "data": {"type": "answer", "sdp": "v=0\r\n..."}}
//! {"type": "ice",    "data": {"candidate": "candidate:...", "sdpMid": "0", "sdpMLineIndex": 0}}
//! ```
//!
//! The envelope carries no version, id or acknowledgement. Unknown `type`
//! values decode to `None` so newer peers can add message kinds.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope tag for offers
pub const OFFER_TAG: &str = "offer";
/// Envelope tag for answers
pub const ANSWER_TAG: &str = "answer";
/// Envelope tag for ICE candidates
pub const ICE_TAG: &str = "ice";

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Proposal from the initiating side
    Offer,
    /// Response to a previously received offer
    Answer,
}

impl SdpKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => OFFER_TAG,
            SdpKind::Answer => ANSWER_TAG,
        }
    }
}

/// Session description in the engine-native `{type, sdp}` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: SdpKind,

    /// Raw SDP text
    pub sdp: String,
}

impl SessionDescription {
    /// Build an offer description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Build an answer description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    /// Check that the SDP looks like a session description
    pub fn validate(&self) -> Result<()> {
        if self.sdp.trim().is_empty() {
            return Err(Error::NegotiationError(format!(
                "empty SDP in {} description",
                self.kind.as_str()
            )));
        }
        if !self.sdp.trim_start().starts_with("v=") {
            return Err(Error::NegotiationError(format!(
                "{} SDP does not start with a version line",
                self.kind.as_str()
            )));
        }
        Ok(())
    }
}

/// ICE candidate in the engine-native `RTCIceCandidateInit` shape
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateData {
    /// Candidate attribute line; empty means end-of-candidates
    pub candidate: String,

    /// Media stream identification tag
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Index of the media description the candidate belongs to
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_mline_index: Option<u16>,

    /// ICE username fragment
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl CandidateData {
    /// Check the candidate line shape
    pub fn validate(&self) -> Result<()> {
        if self.candidate.is_empty() || self.candidate.starts_with("candidate:") {
            Ok(())
        } else {
            Err(Error::IceError(format!(
                "malformed candidate line: {:?}",
                self.candidate
            )))
        }
    }

    /// Whether this marks the end of candidate gathering
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.is_empty()
    }
}

/// Signaling message exchanged with the remote participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum SignalingMessage {
    /// SDP offer
    #[serde(rename = "offer")]
    Offer(SessionDescription),

    /// SDP answer
    #[serde(rename = "answer")]
    Answer(SessionDescription),

    /// Trickled ICE candidate
    #[serde(rename = "ice")]
    IceCandidate(CandidateData),
}

/// Loosely typed envelope used to dispatch on the tag before the payload
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    data: Value,
}

impl SignalingMessage {
    /// Wire tag of the message
    pub fn tag(&self) -> &'static str {
        match self {
            SignalingMessage::Offer(_) => OFFER_TAG,
            SignalingMessage::Answer(_) => ANSWER_TAG,
            SignalingMessage::IceCandidate(_) => ICE_TAG,
        }
    }

    /// Convert message to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize signaling message: {}", e))
        })
    }

    /// Parse a message from JSON text
    ///
    /// Returns `Ok(None)` for well-formed envelopes with an unknown tag.
    ///
    /// # Errors
    ///
    /// - `SerializationError` when the text is not an envelope at all
    /// - `NegotiationError` when an offer/answer payload is malformed
    /// - `IceError` when an ice payload is malformed
    pub fn from_json(json: &str) -> Result<Option<Self>> {
        let envelope: RawEnvelope = serde_json::from_str(json).map_err(|e| {
            Error::SerializationError(format!("Failed to parse signaling envelope: {}", e))
        })?;

        match envelope.tag.as_str() {
            OFFER_TAG => Self::description(envelope.data, SdpKind::Offer)
                .map(|d| Some(SignalingMessage::Offer(d))),
            ANSWER_TAG => Self::description(envelope.data, SdpKind::Answer)
                .map(|d| Some(SignalingMessage::Answer(d))),
            ICE_TAG => {
                let candidate: CandidateData = serde_json::from_value(envelope.data)
                    .map_err(|e| Error::IceError(format!("Invalid ice payload: {}", e)))?;
                Ok(Some(SignalingMessage::IceCandidate(candidate)))
            }
            _ => Ok(None),
        }
    }

    fn description(data: Value, expected: SdpKind) -> Result<SessionDescription> {
        let desc: SessionDescription = serde_json::from_value(data).map_err(|e| {
            Error::NegotiationError(format!("Invalid {} payload: {}", expected.as_str(), e))
        })?;
        if desc.kind != expected {
            return Err(Error::NegotiationError(format!(
                "{} envelope carries a {} description",
                expected.as_str(),
                desc.kind.as_str()
            )));
        }
        Ok(desc)
    }
}
