//! Peer-connection engine backed by the `webrtc` crate

use super::{PeerEngine, PeerEngineFactory};
use crate::config::CallConfig;
use crate::media::{TrackHandle, TrackKind};
use crate::session::{AttemptSink, PeerEvent};
use crate::signaling::{CandidateData, SdpKind, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Opus at 48 kHz stereo, as negotiated by browsers
const OPUS_MIME_TYPE: &str = "audio/opus";
const OPUS_CLOCK_RATE: u32 = 48000;
const OPUS_CHANNELS: u16 = 2;

/// `webrtc` peer connection adapted to [`PeerEngine`]
pub struct RtcPeerEngine {
    /// Identifier used for the local media stream
    stream_id: String,

    peer_connection: Arc<RTCPeerConnection>,

    /// RTP senders for local tracks (retained so the tracks stay attached)
    senders: Mutex<Vec<Arc<RTCRtpSender>>>,
}

impl RtcPeerEngine {
    /// Create a peer connection using the configured STUN/TURN servers
    ///
    /// Engine callbacks are forwarded to `sink` as [`PeerEvent`]s.
    #[instrument(skip(config, sink), fields(generation = %sink.generation()))]
    pub async fn new(config: &CallConfig, sink: AttemptSink) -> Result<Self> {
        let stream_id = format!("voicelink-{}", uuid::Uuid::new_v4());

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnectionError(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::PeerConnectionError(format!("Failed to register interceptors: {}", e))
            })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(config),
            ..Default::default()
        };

        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::PeerConnectionError(format!("Failed to create peer connection: {}", e))
            })?);

        install_callbacks(&peer_connection, sink);

        info!(stream_id = %stream_id, "Created peer connection");

        Ok(Self {
            stream_id,
            peer_connection,
            senders: Mutex::new(Vec::new()),
        })
    }

    /// Underlying peer connection
    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }
}

/// STUN entries first, then TURN entries with credentials
fn ice_servers(config: &CallConfig) -> Vec<RTCIceServer> {
    config
        .stun_servers
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
            urls: vec![turn.url.clone()],
            username: turn.username.clone(),
            credential: turn.credential.clone(),
            ..Default::default()
        }))
        .collect()
}

fn install_callbacks(peer_connection: &Arc<RTCPeerConnection>, sink: AttemptSink) {
    let candidate_sink = sink.clone();
    peer_connection.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let sink = candidate_sink.clone();
        Box::pin(async move {
            // None marks the end of gathering; browsers do not need it relayed
            let Some(candidate) = candidate else {
                debug!("ICE gathering complete");
                return;
            };
            match candidate.to_json() {
                Ok(init) => sink.peer(PeerEvent::LocalCandidate(CandidateData {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_mline_index: init.sdp_mline_index,
                    username_fragment: init.username_fragment,
                })),
                Err(e) => warn!("Failed to serialize local ICE candidate: {}", e),
            }
        })
    }));

    let track_sink = sink.clone();
    peer_connection.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let sink = track_sink.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Video => TrackKind::Video,
                    _ => TrackKind::Audio,
                };
                let handle = TrackHandle::new(track.id(), kind, track.stream_id());
                info!(track = %handle, "Remote track received");
                sink.peer(PeerEvent::RemoteTrack(handle));
            })
        },
    ));

    let negotiation_sink = sink;
    peer_connection.on_negotiation_needed(Box::new(move || {
        let sink = negotiation_sink.clone();
        Box::pin(async move {
            sink.peer(PeerEvent::NegotiationNeeded);
        })
    }));

    peer_connection.on_peer_connection_state_change(Box::new(
        move |state: RTCPeerConnectionState| {
            Box::pin(async move {
                debug!("Peer connection state: {}", state);
            })
        },
    ));
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let converted = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    converted.map_err(|e| Error::NegotiationError(format!("Invalid SDP: {}", e)))
}

#[async_trait]
impl PeerEngine for RtcPeerEngine {
    async fn add_local_track(&self, track: &TrackHandle) -> Result<()> {
        if track.kind() != TrackKind::Audio {
            return Err(Error::NegotiationError(format!(
                "only audio tracks are supported, got {}",
                track
            )));
        }

        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: OPUS_MIME_TYPE.to_string(),
                clock_rate: OPUS_CLOCK_RATE,
                channels: OPUS_CHANNELS,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
            track.id().to_string(),
            self.stream_id.clone(),
        ));

        let sender = self
            .peer_connection
            .add_track(local as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::NegotiationError(format!("Failed to add audio track: {}", e)))?;

        self.senders.lock().push(sender);
        debug!(track = %track, "Audio track attached to peer connection");
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::NegotiationError(format!("Failed to create offer: {}", e)))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::NegotiationError(format!("Failed to create answer: {}", e)))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_local_description(to_rtc(desc)?)
            .await
            .map_err(|e| Error::NegotiationError(format!("Failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.peer_connection
            .set_remote_description(to_rtc(desc)?)
            .await
            .map_err(|e| {
                Error::NegotiationError(format!("Failed to set remote description: {}", e))
            })
    }

    async fn add_ice_candidate(&self, candidate: CandidateData) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        self.senders.lock().clear();
        self.peer_connection
            .close()
            .await
            .map_err(|e| Error::PeerConnectionError(format!("Failed to close peer connection: {}", e)))
    }
}

/// Creates an [`RtcPeerEngine`] per call attempt
#[derive(Debug, Clone, Default)]
pub struct RtcPeerEngineFactory;

impl RtcPeerEngineFactory {
    /// Create a new factory
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerEngineFactory for RtcPeerEngineFactory {
    async fn create(&self, config: &CallConfig, sink: AttemptSink) -> Result<Arc<dyn PeerEngine>> {
        let engine = RtcPeerEngine::new(config, sink).await?;
        Ok(Arc::new(engine))
    }
}
