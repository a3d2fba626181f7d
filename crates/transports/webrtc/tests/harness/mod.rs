//! Test harness for call-session integration tests
//!
//! Wires a [`Coordinator`] to scripted signaling, engine and media doubles and
//! lets tests pump the coordinator's event channel by hand.

#![allow(dead_code, unused_imports)]

pub mod engine;
pub mod media;
pub mod signaling;

pub use engine::{EngineCall, MockEngine, MockEngineFactory, MOCK_SDP};
pub use media::MockMedia;
pub use signaling::{MockConnector, MockTransport};

use std::sync::Arc;
use std::time::Duration;
use voicelink_webrtc::{
    CallConfig, CallRole, CandidateData, Coordinator, SessionDescription, SignalingMessage,
};

/// How long the event channel must stay quiet before `settle` returns
const SETTLE_QUIET: Duration = Duration::from_millis(50);

/// Initialize tracing for tests (safe to call from every test)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,voicelink_webrtc=debug")
        .with_test_writer()
        .try_init();
}

/// Coordinator plus handles on all of its collaborators
pub struct TestCall {
    pub coordinator: Coordinator,
    pub connector: Arc<MockConnector>,
    pub engines: Arc<MockEngineFactory>,
    pub media: Arc<MockMedia>,
}

impl TestCall {
    pub fn new(role: CallRole) -> Self {
        Self::with_engines(role, MockEngineFactory::new())
    }

    pub fn with_engines(role: CallRole, engines: MockEngineFactory) -> Self {
        init_test_tracing();

        let config = CallConfig {
            role,
            ..Default::default()
        };
        let connector = Arc::new(MockConnector::new());
        let engines = Arc::new(engines);
        let media = Arc::new(MockMedia::new());

        let coordinator = Coordinator::new(
            config,
            connector.clone(),
            engines.clone(),
            media.clone(),
        );

        Self {
            coordinator,
            connector,
            engines,
            media,
        }
    }

    /// Handle events until none arrives for a short while
    pub async fn settle(&mut self) {
        while let Ok(Some(event)) =
            tokio::time::timeout(SETTLE_QUIET, self.coordinator.next_event()).await
        {
            self.coordinator.handle_event(event).await;
        }
    }

    /// Transport of the `index`-th attempt
    pub fn transport(&self, index: usize) -> MockTransport {
        self.connector.transport(index)
    }

    /// Engine of the `index`-th attempt
    pub fn engine(&self, index: usize) -> Arc<MockEngine> {
        self.engines.engine(index)
    }
}

pub fn offer_message() -> SignalingMessage {
    SignalingMessage::Offer(SessionDescription::offer(MOCK_SDP))
}

pub fn answer_message() -> SignalingMessage {
    SignalingMessage::Answer(SessionDescription::answer(MOCK_SDP))
}

pub fn candidate_message(line: &str) -> SignalingMessage {
    SignalingMessage::IceCandidate(CandidateData {
        candidate: line.to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    })
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
