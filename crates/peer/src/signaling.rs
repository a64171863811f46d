//! Relay WebSocket client
//!
//! Connects to the signaling relay and exchanges the tagged JSON records
//! from [`dropwire_core::signal`]. Outbound messages go through a channel
//! drained by a sender task; inbound frames are parsed by a receiver task
//! and surfaced as a stream of [`ServerSignal`] values.

use dropwire_core::{ClientSignal, Error, Result, ServerSignal};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for the signaling relay
pub struct SignalingClient {
    /// Relay URL
    url: String,
    /// Outgoing frame sender
    tx: mpsc::UnboundedSender<Message>,
    /// Parsed inbound signals, taken once by the session
    signals: Option<mpsc::UnboundedReceiver<ServerSignal>>,
}

/// Cheap cloneable handle for sending signals from background tasks
#[derive(Clone)]
pub struct SignalingSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl SignalingSender {
    /// Send a signal to the relay
    pub fn send(&self, signal: &ClientSignal) -> Result<()> {
        let json = signal.to_json()?;
        debug!("Sending '{}' to relay", signal.kind());

        self.tx
            .send(Message::Text(json))
            .map_err(|_| Error::SignalingError("Relay connection is closed".to_string()))
    }
}

impl SignalingClient {
    /// Connect to the signaling relay
    ///
    /// Establishes the WebSocket connection and starts background tasks
    /// for sending and receiving frames.
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to signaling relay: {}", url);

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::WebSocketError(format!("Failed to connect: {}", e)))?;

        debug!("Relay connection established");

        let (write, read) = ws_stream.split();

        let (tx, rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, signal_tx, tx.clone()));

        Ok(Self {
            url: url.to_string(),
            tx,
            signals: Some(signal_rx),
        })
    }

    /// Sender task: drains queued frames into the WebSocket
    async fn sender_task(
        mut write: SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }

        debug!("Signaling sender task terminated");
    }

    /// Receiver task: parses inbound frames into signals
    async fn receiver_task(
        mut read: SplitStream<WsStream>,
        signals: mpsc::UnboundedSender<ServerSignal>,
        control: mpsc::UnboundedSender<Message>,
    ) {
        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => match ServerSignal::from_json(&text) {
                    Ok(signal) => {
                        if signals.send(signal).is_err() {
                            debug!("Signal consumer dropped, stopping relay reader");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Ignoring unparseable relay message: {}", e);
                    }
                },
                Ok(Message::Ping(payload)) => {
                    let _ = control.send(Message::Pong(payload));
                }
                Ok(Message::Close(_)) => {
                    info!("Relay closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Relay connection error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        debug!("Signaling receiver task terminated");
    }

    /// Take the stream of inbound signals
    ///
    /// Returns `None` on the second and later calls.
    pub fn take_signals(&mut self) -> Option<mpsc::UnboundedReceiver<ServerSignal>> {
        self.signals.take()
    }

    /// Send a signal to the relay
    pub fn send(&self, signal: &ClientSignal) -> Result<()> {
        self.sender().send(signal)
    }

    /// Handle for sending signals from background tasks
    pub fn sender(&self) -> SignalingSender {
        SignalingSender {
            tx: self.tx.clone(),
        }
    }

    /// The relay URL this client connected to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Queue a close frame; the relay drops the connection on receipt
    pub fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_unreachable_relay_fails() {
        // Port 9 (discard) is assumed unbound
        let result = SignalingClient::connect("ws://127.0.0.1:9").await;

        assert!(matches!(result, Err(Error::WebSocketError(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = SignalingClient::connect("not a url").await;

        assert!(result.is_err());
    }
}
