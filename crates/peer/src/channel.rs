//! Data channel wrapper
//!
//! Wraps `RTCDataChannel` with open/close tracking, transfer statistics,
//! and a typed message callback. Channels are always ordered and reliable;
//! the transfer protocol depends on receive order matching send order.

use bytes::Bytes;
use dropwire_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, warn};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::RTCPeerConnection;

/// Upper bound on a single channel message. SCTP handles more, but nothing
/// in the transfer protocol sends frames anywhere near this size.
pub const MAX_CHANNEL_MESSAGE_SIZE: usize = 64 * 1024;

/// Data channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataChannelState {
    /// Channel is being negotiated
    Connecting,
    /// Channel is open and ready for messages
    Open,
    /// Channel is closing
    Closing,
    /// Channel is closed
    Closed,
}

/// A message received on the channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// A string frame (transfer metadata is sent this way)
    Text(String),
    /// A binary frame (one file chunk)
    Binary(Bytes),
}

/// High-level handle over an ordered, reliable data channel
///
/// Cloning is cheap; clones share state and statistics.
#[derive(Clone)]
pub struct DataChannel {
    /// Channel label
    label: String,
    /// The underlying RTCDataChannel
    rtc_channel: Arc<RTCDataChannel>,
    /// Current channel state
    state: Arc<RwLock<DataChannelState>>,
    /// Flips to true on the channel's open event
    open_rx: watch::Receiver<bool>,
    /// Total bytes sent
    bytes_sent: Arc<RwLock<u64>>,
    /// Total bytes received
    bytes_received: Arc<RwLock<u64>>,
    /// Messages sent count
    messages_sent: Arc<RwLock<u64>>,
    /// Messages received count
    messages_received: Arc<RwLock<u64>>,
}

impl DataChannel {
    /// Create a new ordered, reliable channel on an existing peer connection
    pub async fn create(peer_connection: &RTCPeerConnection, label: &str) -> Result<Self> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };

        let rtc_channel = peer_connection
            .create_data_channel(label, Some(init))
            .await
            .map_err(|e| {
                Error::DataChannelError(format!("Failed to create data channel: {}", e))
            })?;

        Ok(Self::wrap(rtc_channel))
    }

    /// Wrap a channel announced by the remote peer
    pub fn from_existing(rtc_channel: Arc<RTCDataChannel>) -> Self {
        Self::wrap(rtc_channel)
    }

    fn wrap(rtc_channel: Arc<RTCDataChannel>) -> Self {
        let label = rtc_channel.label().to_string();

        // The open event may already have fired for an incoming channel
        let initial_state = match rtc_channel.ready_state() {
            RTCDataChannelState::Open => DataChannelState::Open,
            RTCDataChannelState::Closing => DataChannelState::Closing,
            RTCDataChannelState::Closed => DataChannelState::Closed,
            _ => DataChannelState::Connecting,
        };

        let state = Arc::new(RwLock::new(initial_state));
        let (open_tx, open_rx) = watch::channel(initial_state == DataChannelState::Open);
        let open_tx = Arc::new(open_tx);

        let state_clone = Arc::clone(&state);
        let open_clone = Arc::clone(&open_tx);
        let label_clone = label.clone();

        rtc_channel.on_open(Box::new(move || {
            let state = Arc::clone(&state_clone);
            let open = Arc::clone(&open_clone);
            let label = label_clone.clone();

            Box::pin(async move {
                debug!("Data channel '{}' opened", label);
                *state.write().await = DataChannelState::Open;
                open.send_replace(true);
            })
        }));

        let state_clone = Arc::clone(&state);
        let label_clone = label.clone();

        rtc_channel.on_close(Box::new(move || {
            let state = Arc::clone(&state_clone);
            let label = label_clone.clone();

            Box::pin(async move {
                debug!("Data channel '{}' closed", label);
                *state.write().await = DataChannelState::Closed;
            })
        }));

        let label_clone = label.clone();

        rtc_channel.on_error(Box::new(move |err| {
            let label = label_clone.clone();

            Box::pin(async move {
                error!("Data channel '{}' error: {}", label, err);
            })
        }));

        Self {
            label,
            rtc_channel,
            state,
            open_rx,
            bytes_sent: Arc::new(RwLock::new(0)),
            bytes_received: Arc::new(RwLock::new(0)),
            messages_sent: Arc::new(RwLock::new(0)),
            messages_received: Arc::new(RwLock::new(0)),
        }
    }

    /// Wait until the channel's open event fires, bounded by `timeout`
    pub async fn wait_until_open(&self, timeout: Duration) -> Result<()> {
        let mut open = self.open_rx.clone();

        let outcome = tokio::time::timeout(timeout, async {
            loop {
                if *open.borrow() {
                    return;
                }
                if open.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;

        match outcome {
            Ok(()) if *self.open_rx.borrow() => Ok(()),
            Ok(()) => Err(Error::DataChannelError(format!(
                "Data channel '{}' went away before opening",
                self.label
            ))),
            Err(_) => Err(Error::OperationTimeout(format!(
                "Data channel '{}' did not open within {:?}",
                self.label, timeout
            ))),
        }
    }

    /// Send a string frame
    pub async fn send_text(&self, text: &str) -> Result<()> {
        if text.len() > MAX_CHANNEL_MESSAGE_SIZE {
            return Err(Error::DataChannelError(format!(
                "Message size {} exceeds maximum {} bytes",
                text.len(),
                MAX_CHANNEL_MESSAGE_SIZE
            )));
        }

        let state = *self.state.read().await;
        if state != DataChannelState::Open {
            return Err(Error::DataChannelError(format!(
                "Data channel is not open (state: {:?})",
                state
            )));
        }

        self.rtc_channel
            .send_text(text.to_string())
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to send text: {}", e)))?;

        *self.bytes_sent.write().await += text.len() as u64;
        *self.messages_sent.write().await += 1;

        Ok(())
    }

    /// Send a binary frame
    pub async fn send_binary(&self, data: Bytes) -> Result<()> {
        if data.len() > MAX_CHANNEL_MESSAGE_SIZE {
            return Err(Error::DataChannelError(format!(
                "Message size {} exceeds maximum {} bytes",
                data.len(),
                MAX_CHANNEL_MESSAGE_SIZE
            )));
        }

        let state = *self.state.read().await;
        if state != DataChannelState::Open {
            return Err(Error::DataChannelError(format!(
                "Data channel is not open (state: {:?})",
                state
            )));
        }

        let data_len = data.len();

        self.rtc_channel
            .send(&data)
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to send binary: {}", e)))?;

        *self.bytes_sent.write().await += data_len as u64;
        *self.messages_sent.write().await += 1;

        Ok(())
    }

    /// Set the message handler
    ///
    /// String frames arrive as [`ChannelMessage::Text`], binary frames as
    /// [`ChannelMessage::Binary`]. Non-UTF-8 string frames are discarded
    /// with a warning.
    pub fn on_message<F, Fut>(&self, handler: F)
    where
        F: Fn(ChannelMessage) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let bytes_received = Arc::clone(&self.bytes_received);
        let messages_received = Arc::clone(&self.messages_received);
        let label = self.label.clone();
        let handler = Arc::new(handler);

        self.rtc_channel.on_message(Box::new(move |msg| {
            let bytes_received = Arc::clone(&bytes_received);
            let messages_received = Arc::clone(&messages_received);
            let label = label.clone();
            let handler = Arc::clone(&handler);
            let is_string = msg.is_string;
            let data = msg.data;

            Box::pin(async move {
                *bytes_received.write().await += data.len() as u64;
                *messages_received.write().await += 1;

                let message = if is_string {
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => ChannelMessage::Text(text),
                        Err(_) => {
                            warn!("Discarding non-UTF-8 string frame on channel '{}'", label);
                            return;
                        }
                    }
                } else {
                    ChannelMessage::Binary(data)
                };

                handler(message).await;
            })
        }));
    }

    /// Get the channel label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Get current state
    pub async fn state(&self) -> DataChannelState {
        *self.state.read().await
    }

    /// Check if the channel is open
    pub async fn is_open(&self) -> bool {
        *self.state.read().await == DataChannelState::Open
    }

    /// Get channel statistics
    pub async fn stats(&self) -> ChannelStats {
        ChannelStats {
            bytes_sent: *self.bytes_sent.read().await,
            bytes_received: *self.bytes_received.read().await,
            messages_sent: *self.messages_sent.read().await,
            messages_received: *self.messages_received.read().await,
        }
    }

    /// Close the channel
    pub async fn close(&self) -> Result<()> {
        *self.state.write().await = DataChannelState::Closing;

        self.rtc_channel
            .close()
            .await
            .map_err(|e| Error::DataChannelError(format!("Failed to close channel: {}", e)))?;

        *self.state.write().await = DataChannelState::Closed;

        debug!("Data channel '{}' closed", self.label);
        Ok(())
    }
}

/// Channel statistics
#[derive(Debug, Clone, Default)]
pub struct ChannelStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Messages sent count
    pub messages_sent: u64,
    /// Messages received count
    pub messages_received: u64,
}
