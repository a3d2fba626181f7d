//! WebSocket signaling transport

use super::transport::{SignalingConnector, SignalingTransport};
use crate::session::{AttemptSink, Payload, TransportEvent};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Close code reported when the peer closed without a close frame payload
const NO_STATUS_CODE: u16 = 1005;
/// Close code reported when the stream ended without a close frame
const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Opens signaling connections over WebSocket (ws:// or wss://)
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector
    pub fn new() -> Self {
        Self
    }
}

impl SignalingConnector for WebSocketConnector {
    fn connect(&self, url: &str, sink: AttemptSink) -> Result<Box<dyn SignalingTransport>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::TransportError(format!("No async runtime for signaling connection: {}", e))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        info!(url = %url, generation = %sink.generation(), "Connecting to signaling server");
        let task = runtime.spawn(run_connection(
            url.to_string(),
            rx,
            sink,
            Arc::clone(&open),
        ));

        Ok(Box::new(WebSocketTransport {
            tx,
            open,
            closed: AtomicBool::new(false),
            task,
        }))
    }
}

/// One WebSocket connection driven by a background task
pub struct WebSocketTransport {
    /// Outgoing frames for the connection task
    tx: mpsc::UnboundedSender<Message>,

    /// Set by the connection task while the socket is usable
    open: Arc<AtomicBool>,

    /// Local close requested
    closed: AtomicBool,

    task: JoinHandle<()>,
}

impl SignalingTransport for WebSocketTransport {
    fn send(&self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(Error::TransportError(
                "signaling connection is not open".to_string(),
            ));
        }
        self.tx
            .send(Message::Text(text))
            .map_err(|_| Error::TransportError("signaling connection task ended".to_string()))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if self.open.load(Ordering::SeqCst) {
            debug!("Closing signaling connection");
            // The task may already have exited after a remote close
            let _ = self.tx.send(Message::Close(None));
        } else {
            debug!("Abandoning signaling connection before open");
            self.task.abort();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.open.load(Ordering::SeqCst)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            let _ = self.tx.send(Message::Close(None));
        }
    }
}

/// Connect, then pump frames in both directions until either side closes
async fn run_connection(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    sink: AttemptSink,
    open: Arc<AtomicBool>,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            warn!(url = %url, "Signaling connection failed: {}", e);
            sink.transport(TransportEvent::Failed(format!("Failed to connect: {}", e)));
            return;
        }
    };

    open.store(true, Ordering::SeqCst);
    info!(url = %url, "Connected to signaling server");
    sink.transport(TransportEvent::Opened);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            outgoing = outbound.recv() => {
                let msg = match outgoing {
                    Some(msg) => msg,
                    // Transport handle dropped
                    None => Message::Close(None),
                };
                let closing = matches!(msg, Message::Close(_));

                if let Err(e) = write.send(msg).await {
                    open.store(false, Ordering::SeqCst);
                    if !closing {
                        warn!("Failed to send signaling frame: {}", e);
                        sink.transport(TransportEvent::Failed(format!("Send failed: {}", e)));
                    }
                    break;
                }
                if closing {
                    open.store(false, Ordering::SeqCst);
                    debug!("Signaling connection closed locally");
                    break;
                }
            }
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    sink.transport(TransportEvent::Message(Payload::Text(text)));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    sink.transport(TransportEvent::Message(Payload::Binary(bytes)));
                }
                Some(Ok(Message::Close(frame))) => {
                    open.store(false, Ordering::SeqCst);
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((NO_STATUS_CODE, String::new()));
                    info!(code, reason = %reason, "Signaling server closed the connection");
                    sink.transport(TransportEvent::Closed { code, reason });
                    break;
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    open.store(false, Ordering::SeqCst);
                    warn!("Signaling connection error: {}", e);
                    sink.transport(TransportEvent::Failed(e.to_string()));
                    break;
                }
                None => {
                    open.store(false, Ordering::SeqCst);
                    sink.transport(TransportEvent::Closed {
                        code: ABNORMAL_CLOSE_CODE,
                        reason: "connection dropped".to_string(),
                    });
                    break;
                }
            }
        }
    }

    debug!("Signaling connection task terminated");
}
