//! Peer handshake state machine and session driver
//!
//! [`Handshake`] is the pure state machine: a role and a current state,
//! with the legal transitions for each role spelled out. [`PeerSession`]
//! drives it against real collaborators: the relay signaling client, the
//! short-link token client, and the WebRTC connection wrapper.
//!
//! The offer and answer travel out-of-band as shareable descriptors. The
//! relay never forwards a description to the other peer; it echoes each
//! submission back to its sender, who turns the echo into a short link
//! (or a raw blob when the token store is down) for the human to carry
//! across. Only ICE candidates flow peer-to-peer through the relay.

use crate::channel::DataChannel;
use crate::config::PeerConfig;
use crate::connection::{ConnectionState, PeerConnection};
use crate::sender::FileSender;
use crate::shortlink::{self, TokenClient};
use crate::signaling::{SignalingClient, SignalingSender};
use dropwire_core::{CandidatePayload, ClientSignal, Error, Result, SdpPayload, ServerSignal};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long to wait for the relay to echo a submitted description
const ECHO_TIMEOUT: Duration = Duration::from_secs(10);

/// Which side of the handshake this session plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the offer and shares the first descriptor
    Initiator,
    /// Accepts an offer descriptor and produces the answer
    Responder,
}

impl Role {
    /// Lowercase name for logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }
}

/// Handshake progress states
///
/// The initiator walks `Idle -> CreatingOffer -> OfferSent ->
/// AwaitingAnswer -> Connected`; the responder walks `Idle ->
/// OfferReceived -> CreatingAnswer -> AnswerSent -> Connected`.
/// `Connected`, `Failed`, and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing negotiated yet
    Idle,
    /// Initiator: building the local offer
    CreatingOffer,
    /// Initiator: offer submitted to the relay
    OfferSent,
    /// Initiator: offer published, waiting for the answer descriptor
    AwaitingAnswer,
    /// Responder: offer descriptor resolved
    OfferReceived,
    /// Responder: building the local answer
    CreatingAnswer,
    /// Responder: answer submitted to the relay
    AnswerSent,
    /// Remote description applied; the data channel open event gates transfer
    Connected,
    /// Handshake failed partway
    Failed,
    /// Session torn down
    Closed,
}

fn valid_transition(role: Role, from: HandshakeState, to: HandshakeState) -> bool {
    use HandshakeState::*;

    match role {
        Role::Initiator => matches!(
            (from, to),
            (Idle, CreatingOffer)
                | (CreatingOffer, OfferSent)
                | (OfferSent, AwaitingAnswer)
                | (AwaitingAnswer, Connected)
        ),
        Role::Responder => matches!(
            (from, to),
            (Idle, OfferReceived)
                | (OfferReceived, CreatingAnswer)
                | (CreatingAnswer, AnswerSent)
                | (AnswerSent, Connected)
        ),
    }
}

/// The handshake state machine
///
/// Holds no I/O; [`PeerSession`] owns one and advances it as the dance
/// progresses. Kept separate so transition legality is testable on its own.
#[derive(Debug, Clone)]
pub struct Handshake {
    role: Role,
    state: HandshakeState,
}

impl Handshake {
    /// New handshake in `Idle`
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: HandshakeState::Idle,
        }
    }

    /// The role this handshake plays
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Whether the handshake reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            HandshakeState::Connected | HandshakeState::Failed | HandshakeState::Closed
        )
    }

    /// Advance along the happy path
    ///
    /// Returns an error and leaves the state untouched when the transition
    /// is not legal for this role.
    pub fn advance(&mut self, next: HandshakeState) -> Result<()> {
        if !valid_transition(self.role, self.state, next) {
            return Err(Error::HandshakeError(format!(
                "Invalid {} transition: {:?} -> {:?}",
                self.role.as_str(),
                self.state,
                next
            )));
        }

        debug!(
            "Handshake ({}): {:?} -> {:?}",
            self.role.as_str(),
            self.state,
            next
        );
        self.state = next;

        Ok(())
    }

    /// Mark the handshake failed, unless already terminal
    pub fn fail(&mut self) {
        if !matches!(self.state, HandshakeState::Failed | HandshakeState::Closed) {
            debug!(
                "Handshake ({}): {:?} -> Failed",
                self.role.as_str(),
                self.state
            );
            self.state = HandshakeState::Failed;
        }
    }

    /// Mark the handshake closed
    pub fn shutdown(&mut self) {
        if self.state != HandshakeState::Closed {
            debug!(
                "Handshake ({}): {:?} -> Closed",
                self.role.as_str(),
                self.state
            );
            self.state = HandshakeState::Closed;
        }
    }
}

/// One peer's session: handshake driver plus its collaborators
///
/// A background pump applies remote candidates to the active connection
/// as they arrive and hands description echoes to whichever session
/// method is waiting for them. Candidates that arrive while no connection
/// exists are discarded; there is no replay buffer.
pub struct PeerSession {
    config: PeerConfig,
    handshake: Handshake,
    signaling: SignalingClient,
    tokens: TokenClient,
    /// Shared with the pump task so inbound candidates find the connection
    connection: Arc<RwLock<Option<Arc<PeerConnection>>>>,
    /// Set by the initiator at offer time, by the responder at ready time
    channel: Option<DataChannel>,
    /// Description echoes forwarded by the pump
    echo_rx: mpsc::UnboundedReceiver<ServerSignal>,
    pump_task: JoinHandle<()>,
    trickle_task: Option<JoinHandle<()>>,
}

impl PeerSession {
    /// Start a session in the initiator role
    pub async fn initiator(config: PeerConfig) -> Result<Self> {
        Self::connect(config, Role::Initiator).await
    }

    /// Start a session in the responder role
    pub async fn responder(config: PeerConfig) -> Result<Self> {
        Self::connect(config, Role::Responder).await
    }

    async fn connect(config: PeerConfig, role: Role) -> Result<Self> {
        config.validate()?;

        let mut signaling = SignalingClient::connect(&config.signaling_url).await?;
        let signals = signaling
            .take_signals()
            .ok_or_else(|| Error::InternalError("Signal stream already taken".to_string()))?;

        let (echo_tx, echo_rx) = mpsc::unbounded_channel();
        let connection: Arc<RwLock<Option<Arc<PeerConnection>>>> = Arc::new(RwLock::new(None));

        let pump_task = tokio::spawn(pump_signals(signals, Arc::clone(&connection), echo_tx));
        let tokens = TokenClient::new(&config.shortlink_base);

        info!("Peer session started ({})", role.as_str());

        Ok(Self {
            config,
            handshake: Handshake::new(role),
            signaling,
            tokens,
            connection,
            channel: None,
            echo_rx,
            pump_task,
            trickle_task: None,
        })
    }

    /// The role this session plays
    pub fn role(&self) -> Role {
        self.handshake.role()
    }

    /// Current handshake state
    pub fn state(&self) -> HandshakeState {
        self.handshake.state()
    }

    /// Current lifecycle state of the peer connection, if one exists
    pub async fn connection_state(&self) -> Option<ConnectionState> {
        match self.connection.read().await.as_ref() {
            Some(conn) => Some(conn.state().await),
            None => None,
        }
    }

    /// Number of remote candidates applied so far
    pub async fn remote_candidates_added(&self) -> u64 {
        match self.connection.read().await.as_ref() {
            Some(conn) => conn.remote_candidates_added().await,
            None => 0,
        }
    }

    /// A file sender sliced to this session's configured chunk size
    pub fn file_sender(&self) -> Result<FileSender> {
        FileSender::new(self.config.chunk_size)
    }

    /// Initiator: build the offer and publish it as a shareable descriptor
    ///
    /// Creates the connection and data channel, waits for ICE gathering
    /// bounded by the configured timeout, submits the offer to the relay,
    /// and turns the echo into a short reveal link. Candidates discovered
    /// after the offer leaves keep trickling through the relay. Falls back
    /// to the raw base64 descriptor when the token store is unreachable.
    pub async fn create_share_link(&mut self) -> Result<String> {
        self.ensure_role(Role::Initiator)?;
        self.handshake.advance(HandshakeState::CreatingOffer)?;

        match self.drive_offer().await {
            Ok(link) => Ok(link),
            Err(e) => {
                self.handshake.fail();
                Err(e)
            }
        }
    }

    async fn drive_offer(&mut self) -> Result<String> {
        let conn = Arc::new(PeerConnection::new(&self.config).await?);

        // The channel must exist before the offer so the SDP negotiates it
        let channel = DataChannel::create(conn.rtc(), &self.config.channel_label).await?;
        self.channel = Some(channel);

        let initial = conn.create_offer().await?;
        let offer = self.gathered_local_description(&conn, initial).await;

        *self.connection.write().await = Some(Arc::clone(&conn));

        self.signaling.send(&ClientSignal::Offer { sdp: offer })?;
        self.handshake.advance(HandshakeState::OfferSent)?;
        self.start_trickle(&conn).await;

        let echoed = self.await_echo("offer-created").await?;
        let link = self.publish_descriptor(&echoed).await?;

        self.handshake.advance(HandshakeState::AwaitingAnswer)?;
        info!("Offer published, awaiting answer descriptor");

        Ok(link)
    }

    /// Responder: resolve an offer descriptor and publish the answer
    ///
    /// The descriptor may be a raw base64 blob, a short identifier, or a
    /// pasted reveal URL. Returns the shareable descriptor for the answer,
    /// which must reach the initiator out-of-band.
    pub async fn accept_offer(&mut self, descriptor: &str) -> Result<String> {
        self.ensure_role(Role::Responder)?;
        if self.handshake.state() != HandshakeState::Idle {
            return Err(Error::HandshakeError(format!(
                "Cannot accept an offer in state {:?}",
                self.handshake.state()
            )));
        }

        // Resolve and validate before any state moves so a bad descriptor
        // leaves the session retryable
        let offer = self.resolve_descriptor(descriptor).await?;
        if !offer.is_offer() {
            return Err(Error::SdpError(format!(
                "Expected an offer descriptor, got '{}'",
                offer.kind
            )));
        }

        self.handshake.advance(HandshakeState::OfferReceived)?;

        match self.drive_answer(&offer).await {
            Ok(link) => Ok(link),
            Err(e) => {
                self.handshake.fail();
                Err(e)
            }
        }
    }

    async fn drive_answer(&mut self, offer: &SdpPayload) -> Result<String> {
        let conn = Arc::new(PeerConnection::new(&self.config).await?);

        self.handshake.advance(HandshakeState::CreatingAnswer)?;

        let initial = conn.create_answer_for(offer).await?;
        let answer = self.gathered_local_description(&conn, initial).await;

        *self.connection.write().await = Some(Arc::clone(&conn));

        self.signaling.send(&ClientSignal::Answer { sdp: answer })?;
        self.handshake.advance(HandshakeState::AnswerSent)?;
        self.start_trickle(&conn).await;

        let echoed = self.await_echo("answer-created").await?;
        let link = self.publish_descriptor(&echoed).await?;

        info!("Answer published");

        Ok(link)
    }

    /// Initiator: apply the answer descriptor produced by the responder
    ///
    /// Rejects descriptors that do not resolve to an answer; the handshake
    /// stays in `AwaitingAnswer` so a corrected descriptor can be retried.
    pub async fn accept_answer(&mut self, descriptor: &str) -> Result<()> {
        self.ensure_role(Role::Initiator)?;
        if self.handshake.state() != HandshakeState::AwaitingAnswer {
            return Err(Error::HandshakeError(format!(
                "Cannot accept an answer in state {:?}",
                self.handshake.state()
            )));
        }

        let answer = self.resolve_descriptor(descriptor).await?;
        if !answer.is_answer() {
            return Err(Error::SdpError(format!(
                "Expected an answer descriptor, got '{}'",
                answer.kind
            )));
        }

        let conn = self.active_connection().await?;
        conn.apply_answer(&answer).await?;

        self.handshake.advance(HandshakeState::Connected)?;
        info!("Answer applied, transports negotiating");

        Ok(())
    }

    /// Wait for the data channel to open, bounded by `timeout`
    ///
    /// The channel open event, not the answer exchange, is what enables
    /// transfer. For the responder this also waits for the remote side to
    /// announce the channel in the first place.
    pub async fn wait_until_ready(&mut self, timeout: Duration) -> Result<DataChannel> {
        let channel = match &self.channel {
            Some(channel) => channel.clone(),
            None => {
                let conn = self.active_connection().await?;

                let rtc_channel = tokio::time::timeout(timeout, conn.next_incoming_channel())
                    .await
                    .map_err(|_| {
                        Error::OperationTimeout(format!(
                            "No data channel announced within {:?}",
                            timeout
                        ))
                    })??;

                let channel = DataChannel::from_existing(rtc_channel);
                self.channel = Some(channel.clone());
                channel
            }
        };

        channel.wait_until_open(timeout).await?;

        if self.handshake.state() != HandshakeState::Connected {
            self.handshake.advance(HandshakeState::Connected)?;
        }

        info!("Data channel '{}' open, transfer enabled", channel.label());

        Ok(channel)
    }

    /// Tear the session down
    ///
    /// Closes the channel, the connection, and the relay socket, and stops
    /// the background tasks. Failures during teardown are logged, not
    /// propagated.
    pub async fn close(&mut self) {
        if let Some(task) = self.trickle_task.take() {
            task.abort();
        }

        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("Channel close failed: {}", e);
            }
        }

        if let Some(conn) = self.connection.write().await.take() {
            if let Err(e) = conn.close().await {
                debug!("Connection close failed: {}", e);
            }
        }

        self.signaling.close();
        self.pump_task.abort();
        self.handshake.shutdown();

        info!("Peer session closed");
    }

    fn ensure_role(&self, role: Role) -> Result<()> {
        if self.handshake.role() != role {
            return Err(Error::HandshakeError(format!(
                "Operation requires the {} role",
                role.as_str()
            )));
        }
        Ok(())
    }

    async fn active_connection(&self) -> Result<Arc<PeerConnection>> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::HandshakeError("No active peer connection".to_string()))
    }

    /// Bounded gathering wait, then the freshest local description
    async fn gathered_local_description(
        &self,
        conn: &PeerConnection,
        initial: SdpPayload,
    ) -> SdpPayload {
        let timeout = self.config.gathering_timeout();

        if !conn.wait_for_ice_gathering(timeout).await {
            debug!(
                "ICE gathering still running after {:?}, continuing with current candidates",
                timeout
            );
        }

        conn.local_description().await.unwrap_or(initial)
    }

    async fn start_trickle(&mut self, conn: &Arc<PeerConnection>) {
        if self.trickle_task.is_some() {
            return;
        }

        let candidates = match conn.take_candidates().await {
            Some(rx) => rx,
            None => return,
        };

        let sender = self.signaling.sender();
        self.trickle_task = Some(tokio::spawn(trickle_candidates(candidates, sender)));
    }

    async fn await_echo(&mut self, expected: &'static str) -> Result<SdpPayload> {
        loop {
            let signal = tokio::time::timeout(ECHO_TIMEOUT, self.echo_rx.recv())
                .await
                .map_err(|_| {
                    Error::OperationTimeout(format!(
                        "Timed out waiting for '{}' from relay",
                        expected
                    ))
                })?
                .ok_or_else(|| Error::SignalingError("Relay connection closed".to_string()))?;

            match signal {
                ServerSignal::OfferCreated { sdp } if expected == "offer-created" => return Ok(sdp),
                ServerSignal::AnswerCreated { sdp } if expected == "answer-created" => {
                    return Ok(sdp)
                }
                other => {
                    warn!(
                        "Unexpected relay reply '{}' while waiting for '{}'",
                        other.kind(),
                        expected
                    );
                }
            }
        }
    }

    /// Turn an echoed description into a shareable string
    async fn publish_descriptor(&self, desc: &SdpPayload) -> Result<String> {
        let token = serde_json::to_string(desc).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize description: {}", e))
        })?;

        match self.tokens.shorten(&token).await {
            Ok(id) => Ok(self.tokens.reveal_url(&id)),
            Err(e) => {
                warn!(
                    "Token store unavailable, falling back to raw descriptor: {}",
                    e
                );
                shortlink::encode_descriptor(desc)
            }
        }
    }

    /// Resolve a shareable string back into a description
    async fn resolve_descriptor(&self, input: &str) -> Result<SdpPayload> {
        if let Some(desc) = shortlink::decode_descriptor(input) {
            debug!("Descriptor decoded from raw form");
            return Ok(desc);
        }

        let id = shortlink::extract_short_id(input);
        let token = self.tokens.resolve_id(id).await?;

        serde_json::from_str(&token).map_err(|e| {
            Error::SerializationError(format!("Stored token is not a session description: {}", e))
        })
    }
}

impl Drop for PeerSession {
    fn drop(&mut self) {
        self.pump_task.abort();
        if let Some(task) = self.trickle_task.take() {
            task.abort();
        }
    }
}

/// Background task: apply inbound candidates, forward description echoes
async fn pump_signals(
    mut signals: mpsc::UnboundedReceiver<ServerSignal>,
    connection: Arc<RwLock<Option<Arc<PeerConnection>>>>,
    echoes: mpsc::UnboundedSender<ServerSignal>,
) {
    while let Some(signal) = signals.recv().await {
        match signal {
            ServerSignal::Connected => {
                debug!("Relay acknowledged the connection");
            }
            ServerSignal::IceCandidate { candidate } => {
                let guard = connection.read().await;
                match guard.as_ref() {
                    Some(conn) => {
                        if let Err(e) = conn.add_remote_candidate(&candidate).await {
                            warn!("Failed to apply remote candidate: {}", e);
                        }
                    }
                    None => {
                        debug!("Discarding remote candidate, no active connection");
                    }
                }
            }
            ServerSignal::Error { message } => {
                warn!("Relay rejected a message: {}", message);
            }
            ServerSignal::Unknown => {
                debug!("Ignoring unknown relay message");
            }
            echo @ (ServerSignal::OfferCreated { .. } | ServerSignal::AnswerCreated { .. }) => {
                if echoes.send(echo).is_err() {
                    debug!("Echo consumer dropped");
                }
            }
        }
    }

    debug!("Signal pump terminated");
}

/// Background task: forward locally discovered candidates to the relay
async fn trickle_candidates(
    mut candidates: mpsc::Receiver<CandidatePayload>,
    sender: SignalingSender,
) {
    while let Some(candidate) = candidates.recv().await {
        if let Err(e) = sender.send(&ClientSignal::IceCandidate { candidate }) {
            warn!("Stopped trickling candidates: {}", e);
            break;
        }
    }

    debug!("Candidate trickle terminated");
}
