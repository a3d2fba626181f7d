//! Recording peer-connection engine

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use voicelink_webrtc::session::{AttemptSink, PeerEvent};
use voicelink_webrtc::{
    CallConfig, CandidateData, Error, PeerEngine, PeerEngineFactory, Result, SdpKind,
    SessionDescription, TrackHandle,
};

/// SDP produced by every mock engine
pub const MOCK_SDP: &str = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

/// Calls observed by a [`MockEngine`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    AddTrack(String),
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpKind),
    SetRemote(SdpKind),
    AddCandidate(String),
    Close,
}

pub struct MockEngine {
    sink: AttemptSink,
    calls: Mutex<Vec<EngineCall>>,
    answer_gate: Option<Arc<Semaphore>>,
    offer_gate: Option<Arc<Semaphore>>,
    /// Refuse remote offers in have-local-offer, like an engine without rollback
    strict_signaling: bool,
    have_local_offer: AtomicBool,
    closes: AtomicUsize,
}

impl MockEngine {
    /// Sink of the attempt this engine belongs to, for raising engine events
    pub fn sink(&self) -> AttemptSink {
        self.sink.clone()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Index of the first call matching `call`
    pub fn position(&self, call: &EngineCall) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    /// Raise a locally gathered candidate
    pub fn emit_local_candidate(&self, candidate: &str) {
        self.sink.peer(PeerEvent::LocalCandidate(CandidateData {
            candidate: candidate.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }));
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl PeerEngine for MockEngine {
    async fn add_local_track(&self, track: &TrackHandle) -> Result<()> {
        self.record(EngineCall::AddTrack(track.id().to_string()));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        self.record(EngineCall::CreateOffer);
        if let Some(gate) = &self.offer_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::PeerConnectionError(e.to_string()))?;
        }
        Ok(SessionDescription::offer(MOCK_SDP))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.record(EngineCall::CreateAnswer);
        if let Some(gate) = &self.answer_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::PeerConnectionError(e.to_string()))?;
        }
        Ok(SessionDescription::answer(MOCK_SDP))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(EngineCall::SetLocal(desc.kind));
        if desc.kind == SdpKind::Offer {
            self.have_local_offer.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.record(EngineCall::SetRemote(desc.kind));
        if desc.sdp.contains("a=reject") {
            return Err(Error::PeerConnectionError(
                "incompatible remote description".to_string(),
            ));
        }
        match desc.kind {
            SdpKind::Offer
                if self.strict_signaling && self.have_local_offer.load(Ordering::SeqCst) =>
            {
                Err(Error::PeerConnectionError(
                    "invalid proposed signaling state transition from have-local-offer \
                     applying remote offer"
                        .to_string(),
                ))
            }
            SdpKind::Answer => {
                self.have_local_offer.store(false, Ordering::SeqCst);
                Ok(())
            }
            SdpKind::Offer => Ok(()),
        }
    }

    async fn add_ice_candidate(&self, candidate: CandidateData) -> Result<()> {
        self.record(EngineCall::AddCandidate(candidate.candidate.clone()));
        if candidate.candidate.contains("malformed") {
            return Err(Error::PeerConnectionError(
                "candidate could not be parsed".to_string(),
            ));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(EngineCall::Close);
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory that records every engine it creates
#[derive(Default)]
pub struct MockEngineFactory {
    engines: Mutex<Vec<Arc<MockEngine>>>,
    answer_gate: Option<Arc<Semaphore>>,
    offer_gate: Option<Arc<Semaphore>>,
    strict_signaling: bool,
    fail_create: AtomicBool,
}

impl MockEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engines block in `create_answer` until [`release_answers`](Self::release_answers)
    pub fn with_gated_answers() -> Self {
        Self {
            answer_gate: Some(Arc::new(Semaphore::new(0))),
            ..Default::default()
        }
    }

    pub fn release_answers(&self, count: usize) {
        if let Some(gate) = &self.answer_gate {
            gate.add_permits(count);
        }
    }

    /// Engines block in `create_offer` until [`release_offers`](Self::release_offers)
    pub fn with_gated_offers() -> Self {
        Self {
            offer_gate: Some(Arc::new(Semaphore::new(0))),
            ..Default::default()
        }
    }

    pub fn release_offers(&self, count: usize) {
        if let Some(gate) = &self.offer_gate {
            gate.add_permits(count);
        }
    }

    /// Engines reject a remote offer while their own offer is applied
    pub fn with_strict_signaling() -> Self {
        Self {
            strict_signaling: true,
            ..Default::default()
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn engine(&self, index: usize) -> Arc<MockEngine> {
        Arc::clone(&self.engines.lock()[index])
    }

    pub fn count(&self) -> usize {
        self.engines.lock().len()
    }
}

#[async_trait]
impl PeerEngineFactory for MockEngineFactory {
    async fn create(&self, _config: &CallConfig, sink: AttemptSink) -> Result<Arc<dyn PeerEngine>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::PeerConnectionError("engine unavailable".to_string()));
        }

        let engine = Arc::new(MockEngine {
            sink,
            calls: Mutex::new(Vec::new()),
            answer_gate: self.answer_gate.clone(),
            offer_gate: self.offer_gate.clone(),
            strict_signaling: self.strict_signaling,
            have_local_offer: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
        });
        self.engines.lock().push(Arc::clone(&engine));
        Ok(engine)
    }
}
