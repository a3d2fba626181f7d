//! Session coordinator: the call state machine
//!
//! The coordinator is the single authority over one call attempt. It owns the
//! attempt's peer session, signaling transport and local tracks, applies the
//! signaling protocol in delivery order and is the only place where
//! [`SessionState`] changes.
//!
//! Everything asynchronous reports back through one ordered inbound channel.
//! Each event carries the [`Generation`] of the attempt that produced it, and
//! events from any other generation are dropped before they are looked at.

use super::event::{
    AttemptSink, CoordinatorEvent, EventKind, Generation, NegotiationOutcome, PeerEvent,
    TransportEvent,
};
use super::handle::{CallHandle, Command};
use super::state::SessionState;
use crate::config::CallConfig;
use crate::media::{MediaEndpoint, TrackHandle};
use crate::peer::{PeerEngineFactory, PeerSession};
use crate::signaling::{
    CandidateData, SessionDescription, SignalingConnector, SignalingMessage, SignalingTransport,
};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Capacity of the command channel used by [`CallHandle`]
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Resources and negotiation progress of one call attempt
struct Attempt {
    generation: Generation,
    sink: AttemptSink,
    transport: Option<Box<dyn SignalingTransport>>,
    peer: Arc<PeerSession>,
    local_tracks: Vec<TrackHandle>,

    transport_open: bool,
    /// Offer creation task running
    offer_in_flight: bool,
    /// Raised when a remote offer arrives while our offer is being created;
    /// shared with the offer task so it skips applying the offer
    offer_superseded: Option<Arc<AtomicBool>>,
    /// Our offer was sent and no answer applied yet
    awaiting_answer: bool,
    local_sent: bool,
    remote_applied: bool,
}

impl Attempt {
    fn new(sink: AttemptSink, peer: Arc<PeerSession>) -> Self {
        Self {
            generation: sink.generation(),
            sink,
            transport: None,
            peer,
            local_tracks: Vec::new(),
            transport_open: false,
            offer_in_flight: false,
            offer_superseded: None,
            awaiting_answer: false,
            local_sent: false,
            remote_applied: false,
        }
    }
}

/// Drives one call: transport, peer session, media and state
pub struct Coordinator {
    config: CallConfig,
    connector: Arc<dyn SignalingConnector>,
    engines: Arc<dyn PeerEngineFactory>,
    media: Arc<dyn MediaEndpoint>,

    state_tx: watch::Sender<SessionState>,
    generation: Generation,
    attempt: Option<Attempt>,

    events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events_rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
}

impl Coordinator {
    /// Create an idle coordinator in `Initializing`
    pub fn new(
        config: CallConfig,
        connector: Arc<dyn SignalingConnector>,
        engines: Arc<dyn PeerEngineFactory>,
        media: Arc<dyn MediaEndpoint>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Initializing);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            connector,
            engines,
            media,
            state_tx,
            generation: Generation::default(),
            attempt: None,
            events_tx,
            events_rx,
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Observe state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Generation of the most recent attempt
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether an attempt currently owns a peer session and transport
    pub fn has_live_attempt(&self) -> bool {
        self.attempt.is_some()
    }

    /// Call configuration
    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    fn transition(&self, next: SessionState) -> bool {
        let current = self.state();
        if current == next {
            return false;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "Rejected state transition");
            return false;
        }

        info!(
            generation = %self.generation,
            from = %current,
            to = %next,
            "Session state changed"
        );
        self.state_tx.send_replace(next);
        true
    }

    /// Begin a new call attempt
    ///
    /// Stops the live attempt first, if any. On failure the state is `Error`
    /// and everything constructed so far has been released.
    ///
    /// # Errors
    ///
    /// - `MediaAccessError` when local audio cannot be acquired
    /// - `PeerConnectionError` / `NegotiationError` when the engine cannot be set up
    /// - `TransportError` when the transport cannot even be started
    pub async fn start(&mut self) -> Result<()> {
        if self.attempt.is_some() {
            info!(generation = %self.generation, "Stopping live attempt before starting a new one");
            if let Err(e) = self.stop().await {
                warn!("Previous attempt did not tear down cleanly: {}", e);
            }
        }

        self.generation = self.generation.next();
        let sink = AttemptSink::new(self.generation, self.events_tx.clone());
        info!(
            generation = %self.generation,
            role = ?self.config.role,
            url = %self.config.signaling_url,
            "Starting call attempt"
        );

        let engine = match self.engines.create(&self.config, sink.clone()).await {
            Ok(engine) => engine,
            Err(e) => return Err(self.fail_attempt(e).await),
        };
        let peer = Arc::new(PeerSession::new(engine));
        self.attempt = Some(Attempt::new(sink.clone(), Arc::clone(&peer)));

        let transport = match self.connector.connect(&self.config.signaling_url, sink) {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail_attempt(e).await),
        };
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.transport = Some(transport);
        }
        self.transition(SessionState::Connecting);

        let track = match self.media.acquire_local_audio().await {
            Ok(track) => track,
            Err(e) => {
                let e = match e {
                    Error::MediaAccessError(_) => e,
                    other => Error::MediaAccessError(other.to_string()),
                };
                return Err(self.fail_attempt(e).await);
            }
        };
        if let Some(attempt) = self.attempt.as_mut() {
            attempt.local_tracks.push(track.clone());
        }

        if let Err(e) = peer.add_local_track(track).await {
            return Err(self.fail_attempt(e).await);
        }

        debug!(
            generation = %self.generation,
            session_id = %peer.session_id(),
            "Call attempt started"
        );
        Ok(())
    }

    /// End the call and release everything; safe to call repeatedly
    ///
    /// Every release step is attempted. Failures are collected into
    /// `Error::Teardown`; the state is `Disconnected` either way.
    pub async fn stop(&mut self) -> Result<()> {
        if self.attempt.is_none() && self.state() == SessionState::Disconnected {
            debug!("Stop requested with nothing to stop");
            return Ok(());
        }

        self.transition(SessionState::Disconnecting);
        let failures = self.release_attempt().await;
        self.transition(SessionState::Disconnected);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Teardown(failures))
        }
    }

    /// Stop the current attempt and start a new one
    ///
    /// Nothing from the old attempt can reach the new one: its events carry
    /// the old generation and its peer session is closed.
    pub async fn reconnect(&mut self) -> Result<()> {
        info!(generation = %self.generation, "Reconnecting");
        if let Err(e) = self.stop().await {
            warn!("Teardown before reconnect incomplete: {}", e);
        }
        self.start().await
    }

    /// Log a fatal error, move to `Error` and release the attempt
    async fn fail_attempt(&mut self, err: Error) -> Error {
        error!(generation = %self.generation, "Call attempt failed: {}", err);
        self.transition(SessionState::Error);

        let failures = self.release_attempt().await;
        if !failures.is_empty() {
            warn!(
                "Teardown after failure incomplete: {}",
                Error::Teardown(failures)
            );
        }
        err
    }

    /// Close transport and peer session, release local tracks
    async fn release_attempt(&mut self) -> Vec<Error> {
        let Some(mut attempt) = self.attempt.take() else {
            return Vec::new();
        };

        let mut failures = Vec::new();

        if let Some(transport) = attempt.transport.take() {
            if let Err(e) = transport.close() {
                warn!(generation = %attempt.generation, "Failed to close transport: {}", e);
                failures.push(e);
            }
        }

        if let Err(e) = attempt.peer.close().await {
            warn!(generation = %attempt.generation, "Failed to close peer session: {}", e);
            failures.push(e);
        }

        for track in attempt.local_tracks.drain(..) {
            if let Err(e) = self.media.release_local(&track) {
                warn!(generation = %attempt.generation, track = %track, "Failed to release track: {}", e);
                failures.push(e);
            }
        }

        info!(
            generation = %attempt.generation,
            failures = failures.len(),
            "Released call attempt"
        );
        failures
    }

    /// Wait for the next inbound event
    pub async fn next_event(&mut self) -> Option<CoordinatorEvent> {
        self.events_rx.recv().await
    }

    /// Handle every event already queued, without waiting
    ///
    /// Returns the number of events taken off the channel.
    pub async fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event).await;
            handled += 1;
        }
        handled
    }

    /// Apply one inbound event
    pub async fn handle_event(&mut self, event: CoordinatorEvent) {
        let live = self.attempt.as_ref().map(|a| a.generation);
        if live != Some(event.generation) {
            trace!(
                event_generation = %event.generation,
                live_generation = ?live.map(|g| g.value()),
                "Dropping stale event"
            );
            return;
        }

        let result = match event.kind {
            EventKind::Transport(event) => self.on_transport_event(event).await,
            EventKind::Peer(event) => self.on_peer_event(event).await,
            EventKind::Negotiation(outcome) => self.on_negotiation_outcome(outcome).await,
        };

        if let Err(e) = result {
            if e.is_fatal() {
                self.fail_attempt(e).await;
            } else {
                warn!(generation = %self.generation, "Ignoring non-fatal error: {}", e);
            }
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Opened => {
                let Some(attempt) = self.attempt.as_mut() else {
                    return Ok(());
                };
                attempt.transport_open = true;
                info!(generation = %attempt.generation, "Signaling transport open");

                if self.config.role.initiates_offer() {
                    self.begin_offer();
                }
                Ok(())
            }
            TransportEvent::Message(payload) => {
                let text = match payload.into_text() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Ignoring undecodable signaling frame: {}", e);
                        return Ok(());
                    }
                };

                match SignalingMessage::from_json(&text) {
                    Ok(Some(message)) => self.on_signaling_message(message).await,
                    Ok(None) => {
                        debug!("Ignoring signaling message with unknown type");
                        Ok(())
                    }
                    Err(e @ Error::SerializationError(_)) => {
                        warn!("Ignoring malformed signaling message: {}", e);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            TransportEvent::Closed { code, reason } => {
                info!(code, reason = %reason, "Signaling transport closed");
                let failures = self.release_attempt().await;
                if !failures.is_empty() {
                    warn!("Teardown after close incomplete: {}", Error::Teardown(failures));
                }
                self.transition(SessionState::Disconnected);
                Ok(())
            }
            TransportEvent::Failed(reason) => Err(Error::TransportError(reason)),
        }
    }

    async fn on_signaling_message(&mut self, message: SignalingMessage) -> Result<()> {
        debug!(tag = message.tag(), "Received signaling message");

        match message {
            SignalingMessage::Offer(offer) => self.on_remote_offer(offer).await,
            SignalingMessage::Answer(answer) => self.on_remote_answer(answer).await,
            SignalingMessage::IceCandidate(candidate) => self.on_remote_candidate(candidate).await,
        }
    }

    async fn on_remote_offer(&mut self, offer: SessionDescription) -> Result<()> {
        let Some(attempt) = self.attempt.as_mut() else {
            return Ok(());
        };

        let was_awaiting = attempt.awaiting_answer;
        let collision = attempt.awaiting_answer || attempt.offer_in_flight;
        if collision {
            warn!(
                generation = %attempt.generation,
                "Offer collision, applying the remote offer over our own"
            );
            attempt.awaiting_answer = false;
            if let Some(superseded) = &attempt.offer_superseded {
                superseded.store(true, Ordering::SeqCst);
            }
        }
        let peer = Arc::clone(&attempt.peer);
        let sink = attempt.sink.clone();

        // Applied inline so later candidates find the remote description
        if let Err(e) = peer.set_remote_description(offer).await {
            if !collision {
                return Err(e);
            }
            // Engines without rollback refuse a remote offer in have-local-offer
            warn!(
                generation = %self.generation,
                "Remote offer rejected during collision, keeping our own offer: {}", e
            );
            if let Some(attempt) = self.attempt.as_mut() {
                attempt.awaiting_answer = was_awaiting;
                if let Some(superseded) = &attempt.offer_superseded {
                    superseded.store(false, Ordering::SeqCst);
                }
            }
            return Ok(());
        }

        if let Some(attempt) = self.attempt.as_mut() {
            attempt.remote_applied = true;
        }

        tokio::spawn(async move {
            let result = answer_task(&peer).await;
            sink.negotiation(NegotiationOutcome::AnswerCreated(result));
        });
        Ok(())
    }

    async fn on_remote_answer(&mut self, answer: SessionDescription) -> Result<()> {
        let Some(attempt) = self.attempt.as_mut() else {
            return Ok(());
        };
        if !attempt.awaiting_answer {
            warn!(
                generation = %attempt.generation,
                "Discarding answer with no outstanding offer"
            );
            return Ok(());
        }
        let peer = Arc::clone(&attempt.peer);

        peer.set_remote_description(answer).await?;

        if let Some(attempt) = self.attempt.as_mut() {
            attempt.awaiting_answer = false;
            attempt.remote_applied = true;
        }
        self.maybe_connected();
        Ok(())
    }

    async fn on_remote_candidate(&mut self, candidate: CandidateData) -> Result<()> {
        let Some(attempt) = self.attempt.as_ref() else {
            return Ok(());
        };
        let peer = Arc::clone(&attempt.peer);

        if let Err(e) = peer.add_remote_candidate(candidate).await {
            warn!(generation = %self.generation, "Failed to apply remote candidate: {}", e);
        }
        Ok(())
    }

    async fn on_peer_event(&mut self, event: PeerEvent) -> Result<()> {
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                let Some(attempt) = self.attempt.as_ref() else {
                    return Ok(());
                };
                let open = attempt.transport_open
                    && attempt.transport.as_ref().is_some_and(|t| t.is_open());
                if !open {
                    debug!("Dropping local candidate, signaling not open");
                    return Ok(());
                }

                if let Err(e) = self.send(SignalingMessage::IceCandidate(candidate)) {
                    warn!("Failed to send local candidate: {}", e);
                }
                Ok(())
            }
            PeerEvent::RemoteTrack(track) => {
                info!(track = %track, "Playing remote track");
                if let Err(e) = self.media.play_remote(track) {
                    warn!("Failed to play remote track: {}", e);
                }
                Ok(())
            }
            PeerEvent::NegotiationNeeded => {
                let transport_open = self.attempt.as_ref().is_some_and(|a| a.transport_open);
                if self.config.role.initiates_offer() && transport_open {
                    self.begin_offer();
                } else {
                    debug!("Negotiation needed, waiting for the other side or for signaling");
                }
                Ok(())
            }
        }
    }

    async fn on_negotiation_outcome(&mut self, outcome: NegotiationOutcome) -> Result<()> {
        match outcome {
            NegotiationOutcome::OfferCreated(result) => {
                let Some(attempt) = self.attempt.as_mut() else {
                    return Ok(());
                };
                attempt.offer_in_flight = false;

                let superseded = attempt
                    .offer_superseded
                    .take()
                    .is_some_and(|flag| flag.load(Ordering::SeqCst));
                if superseded {
                    warn!(
                        generation = %attempt.generation,
                        "Discarding local offer superseded by the remote offer"
                    );
                    return Ok(());
                }

                let Some(offer) = result? else {
                    debug!(generation = %self.generation, "Local offer discarded before it was applied");
                    return Ok(());
                };
                self.send(SignalingMessage::Offer(offer))?;

                if let Some(attempt) = self.attempt.as_mut() {
                    attempt.awaiting_answer = true;
                    attempt.local_sent = true;
                }
                Ok(())
            }
            NegotiationOutcome::AnswerCreated(result) => {
                let answer = result?;
                self.send(SignalingMessage::Answer(answer))?;

                if let Some(attempt) = self.attempt.as_mut() {
                    attempt.local_sent = true;
                }
                self.maybe_connected();
                Ok(())
            }
        }
    }

    /// Spawn offer creation unless one is already outstanding
    fn begin_offer(&mut self) {
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        if attempt.offer_in_flight || attempt.awaiting_answer {
            debug!(generation = %attempt.generation, "Offer already outstanding");
            return;
        }

        let superseded = Arc::new(AtomicBool::new(false));
        attempt.offer_in_flight = true;
        attempt.offer_superseded = Some(Arc::clone(&superseded));
        let peer = Arc::clone(&attempt.peer);
        let sink = attempt.sink.clone();
        debug!(generation = %attempt.generation, "Creating offer");

        tokio::spawn(async move {
            let result = offer_task(&peer, &superseded).await;
            sink.negotiation(NegotiationOutcome::OfferCreated(result));
        });
    }

    fn send(&self, message: SignalingMessage) -> Result<()> {
        let transport = self
            .attempt
            .as_ref()
            .and_then(|a| a.transport.as_ref())
            .ok_or_else(|| Error::TransportError("no signaling transport".to_string()))?;

        let text = message.to_json()?;
        debug!(tag = message.tag(), "Sending signaling message");
        transport.send(text)
    }

    fn maybe_connected(&self) {
        let Some(attempt) = self.attempt.as_ref() else {
            return;
        };
        if self.state() == SessionState::Connecting
            && attempt.transport_open
            && attempt.local_sent
            && attempt.remote_applied
        {
            self.transition(SessionState::Connected);
        }
    }

    /// Serve commands and events until shutdown
    ///
    /// Shutdown (or every [`CallHandle`] being dropped) stops the call before
    /// returning.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Result<()> {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Reconnect) => {
                        if let Err(e) = self.reconnect().await {
                            error!("Reconnect failed: {}", e);
                        }
                    }
                    Some(Command::Stop) => {
                        if let Err(e) = self.stop().await {
                            warn!("Stop incomplete: {}", e);
                        }
                    }
                    Some(Command::Shutdown) | None => {
                        info!("Shutting down call coordinator");
                        return self.stop().await;
                    }
                },
                Some(event) = self.events_rx.recv() => {
                    self.handle_event(event).await;
                }
            }
        }
    }

    /// Start the first attempt and serve it on a background task
    pub fn spawn(mut self) -> (CallHandle, JoinHandle<Result<()>>) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = CallHandle::new(commands_tx, self.subscribe());

        let task = tokio::spawn(async move {
            if let Err(e) = self.start().await {
                error!("Initial call attempt failed: {}", e);
            }
            self.run(commands_rx).await
        });

        (handle, task)
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        let Some(mut attempt) = self.attempt.take() else {
            return;
        };
        warn!(generation = %attempt.generation, "Coordinator dropped with a live attempt");

        if let Some(transport) = attempt.transport.take() {
            let _ = transport.close();
        }
        for track in attempt.local_tracks.drain(..) {
            let _ = self.media.release_local(&track);
        }

        let peer = attempt.peer;
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = peer.close().await;
            });
        }
    }
}

/// Create and apply an offer; `None` when a remote offer superseded it first
async fn offer_task(
    peer: &PeerSession,
    superseded: &AtomicBool,
) -> Result<Option<SessionDescription>> {
    let offer = peer.create_offer().await?;
    if superseded.load(Ordering::SeqCst) {
        return Ok(None);
    }
    peer.set_local_description(offer.clone()).await?;
    Ok(Some(offer))
}

async fn answer_task(peer: &PeerSession) -> Result<SessionDescription> {
    let answer = peer.create_answer().await?;
    peer.set_local_description(answer.clone()).await?;
    Ok(answer)
}
