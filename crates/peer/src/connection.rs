//! WebRTC peer connection wrapper
//!
//! Owns the underlying `RTCPeerConnection`, converts between the wire
//! signal types and the webrtc-rs API, and surfaces locally discovered
//! ICE candidates through a channel so the session can trickle them.

use crate::config::PeerConfig;
use dropwire_core::{CandidatePayload, Error, Result, SdpPayload};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection created, no negotiation started
    New,
    /// Local description set, ICE candidates being gathered
    GatheringIce,
    /// Remote description applied, transports connecting
    Connecting,
    /// Transports established
    Connected,
    /// Connection failed
    Failed,
    /// Connection closed
    Closed,
}

/// Wrapper around a webrtc-rs peer connection
///
/// Local candidates are pushed into an internal channel the moment the ICE
/// stack discovers them; [`take_candidates`](Self::take_candidates) hands
/// that stream to whoever forwards them to the relay. A separate watch flag
/// flips when gathering reports completion, backing the bounded wait in
/// [`wait_for_ice_gathering`](Self::wait_for_ice_gathering).
pub struct PeerConnection {
    /// Unique id for log correlation
    connection_id: String,
    /// The underlying RTCPeerConnection
    peer_connection: Arc<RTCPeerConnection>,
    /// Current lifecycle state
    state: Arc<RwLock<ConnectionState>>,
    /// Locally discovered candidates, taken once by the trickle forwarder
    candidates: Mutex<Option<mpsc::Receiver<CandidatePayload>>>,
    /// Flips to true when the ICE stack reports gathering complete
    gathering_rx: watch::Receiver<bool>,
    /// Data channels announced by the remote peer
    incoming_channels: Mutex<mpsc::Receiver<Arc<RTCDataChannel>>>,
    /// Count of remote candidates applied so far
    remote_candidates: Arc<RwLock<u64>>,
}

impl PeerConnection {
    /// Create a new peer connection from configuration
    pub async fn new(config: &PeerConfig) -> Result<Self> {
        let connection_id = uuid::Uuid::new_v4().to_string();

        info!("Creating peer connection: connection_id={}", connection_id);

        // Create MediaEngine with default codecs
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        // Create InterceptorRegistry with default interceptors
        let interceptor_registry =
            register_default_interceptors(Default::default(), &mut media_engine).map_err(|e| {
                Error::WebRtcError(format!("Failed to register interceptors: {}", e))
            })?;

        let mut setting_engine = SettingEngine::default();
        if config.include_loopback {
            setting_engine.set_include_loopback_candidate(true);
        }

        // Build WebRTC API
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .with_setting_engine(setting_engine)
            .build();

        // Configure ICE servers (STUN only, no TURN fallback)
        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        // Create peer connection
        let peer_connection =
            Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
                Error::WebRtcError(format!("Failed to create peer connection: {}", e))
            })?);

        let state = Arc::new(RwLock::new(ConnectionState::New));

        // Set up connection state change handler
        let state_clone = Arc::clone(&state);
        let id_clone = connection_id.clone();

        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let state_clone = Arc::clone(&state_clone);
                let connection_id = id_clone.clone();

                Box::pin(async move {
                    let new_state = match s {
                        RTCPeerConnectionState::New => ConnectionState::New,
                        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
                        RTCPeerConnectionState::Connected => ConnectionState::Connected,
                        RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Closed => {
                            ConnectionState::Closed
                        }
                        RTCPeerConnectionState::Failed => ConnectionState::Failed,
                        _ => return,
                    };

                    let mut state_guard = state_clone.write().await;
                    let old_state = *state_guard;

                    if old_state != new_state {
                        debug!(
                            "Connection {} state transition: {:?} -> {:?}",
                            connection_id, old_state, new_state
                        );
                        *state_guard = new_state;
                    }
                })
            },
        ));

        // Forward locally discovered candidates; a None candidate marks the
        // end of gathering
        let (candidate_tx, candidate_rx) = mpsc::channel::<CandidatePayload>(64);
        let (gathering_tx, gathering_rx) = watch::channel(false);
        let gathering_tx = Arc::new(gathering_tx);
        let id_clone = connection_id.clone();

        peer_connection.on_ice_candidate(Box::new(move |candidate| {
            let candidate_tx = candidate_tx.clone();
            let gathering_tx = Arc::clone(&gathering_tx);
            let connection_id = id_clone.clone();

            Box::pin(async move {
                match candidate {
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => {
                            let payload = CandidatePayload {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            };

                            if candidate_tx.send(payload).await.is_err() {
                                debug!(
                                    "Connection {}: local candidate dropped, no trickle consumer",
                                    connection_id
                                );
                            }
                        }
                        Err(e) => {
                            warn!("Failed to serialize local candidate: {}", e);
                        }
                    },
                    None => {
                        debug!("Connection {}: ICE gathering complete", connection_id);
                        gathering_tx.send_replace(true);
                    }
                }
            })
        }));

        // Queue data channels announced by the remote side
        let (incoming_tx, incoming_rx) = mpsc::channel::<Arc<RTCDataChannel>>(4);

        peer_connection.on_data_channel(Box::new(move |channel: Arc<RTCDataChannel>| {
            let incoming_tx = incoming_tx.clone();

            Box::pin(async move {
                debug!("Remote peer announced data channel '{}'", channel.label());
                if incoming_tx.send(channel).await.is_err() {
                    warn!("Incoming data channel discarded, receiver closed");
                }
            })
        }));

        Ok(Self {
            connection_id,
            peer_connection,
            state,
            candidates: Mutex::new(Some(candidate_rx)),
            gathering_rx,
            incoming_channels: Mutex::new(incoming_rx),
            remote_candidates: Arc::new(RwLock::new(0)),
        })
    }

    /// Unique connection id
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// The underlying RTCPeerConnection
    pub fn rtc(&self) -> &Arc<RTCPeerConnection> {
        &self.peer_connection
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.write().await;
        if *state != new_state {
            debug!(
                "Connection {} state transition: {:?} -> {:?}",
                self.connection_id, *state, new_state
            );
            *state = new_state;
        }
    }

    /// Create an SDP offer and install it as the local description
    ///
    /// Candidate gathering starts as a side effect; the returned payload
    /// holds only the candidates known at this instant. Call
    /// [`local_description`](Self::local_description) after
    /// [`wait_for_ice_gathering`](Self::wait_for_ice_gathering) to pick up
    /// candidates gathered in the meantime.
    pub async fn create_offer(&self) -> Result<SdpPayload> {
        self.set_state(ConnectionState::GatheringIce).await;

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create offer: {}", e)))?;

        self.peer_connection
            .set_local_description(offer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::SdpError("No local description after setting offer".to_string())
            })?;

        debug!("Connection {}: created SDP offer", self.connection_id);

        Ok(SdpPayload::offer(local_desc.sdp))
    }

    /// Apply a remote offer and produce the local answer
    ///
    /// Rejects payloads whose type is not `offer` without touching the
    /// connection.
    pub async fn create_answer_for(&self, offer: &SdpPayload) -> Result<SdpPayload> {
        if !offer.is_offer() {
            return Err(Error::SdpError(format!(
                "Cannot answer a '{}' description",
                offer.kind
            )));
        }

        self.set_state(ConnectionState::GatheringIce).await;

        let remote = RTCSessionDescription::offer(offer.sdp.clone())
            .map_err(|e| Error::SdpError(format!("Failed to parse offer: {}", e)))?;

        self.peer_connection
            .set_remote_description(remote)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to create answer: {}", e)))?;

        self.peer_connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set local description: {}", e)))?;

        let local_desc = self
            .peer_connection
            .local_description()
            .await
            .ok_or_else(|| {
                Error::SdpError("No local description after setting answer".to_string())
            })?;

        debug!("Connection {}: created SDP answer", self.connection_id);

        Ok(SdpPayload::answer(local_desc.sdp))
    }

    /// Apply the remote answer
    ///
    /// Rejects payloads whose type is not `answer` without touching the
    /// connection.
    pub async fn apply_answer(&self, answer: &SdpPayload) -> Result<()> {
        if !answer.is_answer() {
            return Err(Error::SdpError(format!(
                "Expected an answer description, got '{}'",
                answer.kind
            )));
        }

        let remote = RTCSessionDescription::answer(answer.sdp.clone())
            .map_err(|e| Error::SdpError(format!("Failed to parse answer: {}", e)))?;

        self.peer_connection
            .set_remote_description(remote)
            .await
            .map_err(|e| Error::SdpError(format!("Failed to set remote description: {}", e)))?;

        self.set_state(ConnectionState::Connecting).await;

        Ok(())
    }

    /// Current local description, including candidates gathered so far
    pub async fn local_description(&self) -> Option<SdpPayload> {
        self.peer_connection
            .local_description()
            .await
            .map(|desc| SdpPayload {
                kind: desc.sdp_type.to_string(),
                sdp: desc.sdp,
            })
    }

    /// Apply a candidate trickled by the remote peer
    pub async fn add_remote_candidate(&self, candidate: &CandidatePayload) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment.clone(),
        };

        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| Error::IceCandidateError(format!("Failed to add ICE candidate: {}", e)))?;

        *self.remote_candidates.write().await += 1;

        debug!("Connection {}: applied remote candidate", self.connection_id);

        Ok(())
    }

    /// Number of remote candidates applied so far
    pub async fn remote_candidates_added(&self) -> u64 {
        *self.remote_candidates.read().await
    }

    /// Take the stream of locally discovered candidates
    ///
    /// Returns `None` on the second and later calls.
    pub async fn take_candidates(&self) -> Option<mpsc::Receiver<CandidatePayload>> {
        self.candidates.lock().await.take()
    }

    /// Wait for the next data channel announced by the remote peer
    pub async fn next_incoming_channel(&self) -> Result<Arc<RTCDataChannel>> {
        let mut incoming = self.incoming_channels.lock().await;
        incoming.recv().await.ok_or_else(|| {
            Error::PeerConnectionError(
                "Connection closed before a data channel arrived".to_string(),
            )
        })
    }

    /// Wait until ICE gathering completes, bounded by `timeout`
    ///
    /// Returns true if gathering finished within the bound. A false return
    /// is not a failure: negotiation proceeds with the candidates collected
    /// so far and later discoveries trickle through the candidate stream.
    pub async fn wait_for_ice_gathering(&self, timeout: Duration) -> bool {
        gathering_wait(self.gathering_rx.clone(), timeout).await
    }

    /// Close the connection
    pub async fn close(&self) -> Result<()> {
        info!("Closing peer connection {}", self.connection_id);

        self.set_state(ConnectionState::Closed).await;

        self.peer_connection.close().await.map_err(|e| {
            Error::PeerConnectionError(format!("Failed to close connection: {}", e))
        })?;

        Ok(())
    }
}

/// Bounded wait on a gathering-complete flag
pub(crate) async fn gathering_wait(mut complete: watch::Receiver<bool>, timeout: Duration) -> bool {
    let outcome = tokio::time::timeout(timeout, async {
        loop {
            if *complete.borrow() {
                return true;
            }
            if complete.changed().await.is_err() {
                return *complete.borrow();
            }
        }
    })
    .await;

    matches!(outcome, Ok(true))
}
