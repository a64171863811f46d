//! WebSocket connection handling for the signaling relay
//!
//! Each accepted connection gets an id, an outbound queue, and an entry in
//! the shared registry. Offers and answers are echoed back to their sender;
//! ICE candidates are flooded to every other connection. A message the relay
//! cannot parse is answered with an error and the connection stays open.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Message, Result as WsResult},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dropwire_core::{ClientSignal, ServerSignal};

use crate::registry::ConnectionRegistry;

/// Handle a single signaling connection until it closes
pub async fn handle_connection(stream: TcpStream, registry: ConnectionRegistry) -> WsResult<()> {
    let addr = stream.peer_addr()?;
    info!("New signaling connection from: {}", addr);

    let ws_stream = accept_async(stream).await?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    // Channel for sending messages back to this connection
    let (tx, mut rx) = mpsc::channel::<String>(128);

    // Task to forward messages from channel to WebSocket
    let ws_tx = Arc::new(RwLock::new(ws_tx));
    let ws_tx_clone = Arc::clone(&ws_tx);
    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let mut ws_tx = ws_tx_clone.write().await;
            if let Err(e) = ws_tx.send(Message::Text(msg)).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let connection_id = Uuid::new_v4();
    registry.register(connection_id, tx.clone()).await;

    // Acknowledge registration before any signaling traffic flows
    if let Ok(json) = ServerSignal::Connected.to_json() {
        let _ = tx.send(json).await;
    }

    // Process incoming messages
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_signal(&text, &connection_id, &registry, &tx).await;
            }
            Ok(Message::Close(_)) => {
                info!("Signaling connection closed by client: {}", addr);
                break;
            }
            Ok(Message::Ping(data)) => {
                let mut ws_tx = ws_tx.write().await;
                let _ = ws_tx.send(Message::Pong(data)).await;
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", addr, e);
                break;
            }
            _ => {}
        }
    }

    // Cleanup on disconnect; removal is ordered before the forward task dies
    // so no broadcast can observe a half-torn-down connection
    registry.unregister(&connection_id).await;
    forward_task.abort();
    info!(connection_id = %connection_id, "Signaling connection cleaned up");

    Ok(())
}

/// Dispatch one parsed-or-rejected text frame
async fn handle_signal(
    text: &str,
    connection_id: &Uuid,
    registry: &ConnectionRegistry,
    tx: &mpsc::Sender<String>,
) {
    let signal = match ClientSignal::from_json(text) {
        Ok(signal) => signal,
        Err(e) => {
            warn!(connection_id = %connection_id, "Rejected unparseable signal: {}", e);
            send_error(tx, format!("Failed to parse message: {}", e)).await;
            return;
        }
    };

    match signal {
        ClientSignal::Offer { sdp } => {
            debug!(connection_id = %connection_id, "Echoing offer back to sender");
            reply(tx, &ServerSignal::OfferCreated { sdp }).await;
        }
        ClientSignal::Answer { sdp } => {
            debug!(connection_id = %connection_id, "Echoing answer back to sender");
            reply(tx, &ServerSignal::AnswerCreated { sdp }).await;
        }
        ClientSignal::IceCandidate { candidate } => {
            let broadcast = ServerSignal::IceCandidate { candidate };
            match broadcast.to_json() {
                Ok(json) => {
                    let delivered = registry.broadcast_except(connection_id, json).await;
                    debug!(
                        connection_id = %connection_id,
                        delivered,
                        "Broadcast ICE candidate"
                    );
                }
                Err(e) => error!("Failed to serialize candidate broadcast: {}", e),
            }
        }
        ClientSignal::Unknown => {
            warn!(connection_id = %connection_id, "Rejected message with unknown type");
            send_error(tx, "Unknown message type".to_string()).await;
        }
    }
}

async fn reply(tx: &mpsc::Sender<String>, signal: &ServerSignal) {
    match signal.to_json() {
        Ok(json) => {
            if tx.send(json).await.is_err() {
                warn!("Outbound queue closed while replying");
            }
        }
        Err(e) => error!("Failed to serialize reply: {}", e),
    }
}

async fn send_error(tx: &mpsc::Sender<String>, message: String) {
    reply(tx, &ServerSignal::Error { message }).await;
}
