//! Scripted signaling transport
//!
//! Each `connect` creates a [`MockTransport`] that the test drives by hand:
//! open it, deliver frames, close or fail it, and inspect what was sent.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use voicelink_webrtc::session::{AttemptSink, Payload, TransportEvent};
use voicelink_webrtc::{Error, Result, SignalingConnector, SignalingMessage, SignalingTransport};

struct TransportInner {
    url: String,
    sink: AttemptSink,
    sent: Mutex<Vec<String>>,
    open: AtomicBool,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

/// Test-controlled transport; clones share state
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<TransportInner>,
}

impl MockTransport {
    /// URL passed to `connect`
    pub fn url(&self) -> String {
        self.inner.url.clone()
    }

    /// Sink of the attempt that opened this transport
    pub fn sink(&self) -> AttemptSink {
        self.inner.sink.clone()
    }

    /// Simulate the server accepting the connection
    pub fn open(&self) {
        self.inner.open.store(true, Ordering::SeqCst);
        self.inner.sink.transport(TransportEvent::Opened);
    }

    /// Deliver a raw text frame
    pub fn deliver(&self, text: &str) {
        self.inner
            .sink
            .transport(TransportEvent::Message(Payload::Text(text.to_string())));
    }

    /// Deliver a raw binary frame
    pub fn deliver_binary(&self, bytes: &[u8]) {
        self.inner
            .sink
            .transport(TransportEvent::Message(Payload::Binary(bytes.to_vec())));
    }

    /// Deliver an encoded signaling message
    pub fn deliver_message(&self, message: &SignalingMessage) {
        let text = message.to_json().unwrap();
        self.deliver(&text);
    }

    /// Simulate the server closing the connection
    pub fn remote_close(&self, code: u16, reason: &str) {
        self.inner.open.store(false, Ordering::SeqCst);
        self.inner.sink.transport(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Simulate a network failure
    pub fn fail(&self, reason: &str) {
        self.inner.open.store(false, Ordering::SeqCst);
        self.inner
            .sink
            .transport(TransportEvent::Failed(reason.to_string()));
    }

    /// Raw frames sent by the coordinator
    pub fn sent(&self) -> Vec<String> {
        self.inner.sent.lock().clone()
    }

    /// Decoded messages sent by the coordinator
    pub fn sent_messages(&self) -> Vec<SignalingMessage> {
        self.sent()
            .iter()
            .map(|text| SignalingMessage::from_json(text).unwrap().unwrap())
            .collect()
    }

    /// Envelope tags of sent messages, in order
    pub fn sent_tags(&self) -> Vec<&'static str> {
        self.sent_messages().iter().map(|m| m.tag()).collect()
    }

    /// Number of `close()` calls received
    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    /// Whether `close()` was called
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl SignalingTransport for MockTransport {
    fn send(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::TransportError("mock transport not open".to_string()));
        }
        self.inner.sent.lock().push(text);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst) && !self.inner.closed.load(Ordering::SeqCst)
    }
}

/// Connector that hands out [`MockTransport`]s and remembers them
#[derive(Default)]
pub struct MockConnector {
    transports: Mutex<Vec<MockTransport>>,
    refuse: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` calls fail synchronously
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Transport created by the `index`-th connect
    pub fn transport(&self, index: usize) -> MockTransport {
        self.transports.lock()[index].clone()
    }

    /// Most recently created transport
    pub fn last(&self) -> Option<MockTransport> {
        self.transports.lock().last().cloned()
    }

    /// Number of transports created so far
    pub fn count(&self) -> usize {
        self.transports.lock().len()
    }
}

impl SignalingConnector for MockConnector {
    fn connect(&self, url: &str, sink: AttemptSink) -> Result<Box<dyn SignalingTransport>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::TransportError("connection refused".to_string()));
        }

        let transport = MockTransport {
            inner: Arc::new(TransportInner {
                url: url.to_string(),
                sink,
                sent: Mutex::new(Vec::new()),
                open: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                close_calls: AtomicUsize::new(0),
            }),
        };
        self.transports.lock().push(transport.clone());
        Ok(Box::new(transport))
    }
}
