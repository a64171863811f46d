//! Peer-side engine for direct file transfer
//!
//! This crate drives one side of a peer-to-peer file transfer: it
//! negotiates a WebRTC connection through a lightweight relay, exchanges
//! session descriptions out-of-band as short links, and streams files
//! over the resulting data channel in bounded chunks.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  PeerSession (handshake driver)                       │
//! │  ├─ SignalingClient (WebSocket to the relay)          │
//! │  │    · description echoes back to their sender       │
//! │  │    · ICE candidates broadcast to the other peer    │
//! │  ├─ TokenClient (short links for offer/answer)        │
//! │  └─ PeerConnection (WebRTC wrapper)                   │
//! │       └─ DataChannel                                  │
//! │            ├─ FileSender   (metadata + chunks out)    │
//! │            └─ FileReceiver (reassembly in)            │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! The relay never forwards an offer or answer to the other peer. Each
//! descriptor is echoed back to whoever submitted it, shortened into a
//! link, and carried across by the humans involved. Only ICE candidates
//! travel peer-to-peer through the relay.
//!
//! # Example
//!
//! ```
//! use dropwire_peer::PeerConfig;
//!
//! let config = PeerConfig::default()
//!     .with_signaling_url("ws://relay.example:9001")
//!     .with_shortlink_base("http://relay.example:8080");
//!
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Sending a file
//!
//! ```no_run
//! use dropwire_peer::{FileSender, PeerConfig, PeerSession};
//! use std::time::Duration;
//!
//! # async fn example() -> dropwire_core::Result<()> {
//! let mut session = PeerSession::initiator(PeerConfig::default()).await?;
//!
//! let link = session.create_share_link().await?;
//! println!("Share this link: {}", link);
//!
//! // ... the other side opens the link and sends back an answer ...
//! # let answer_descriptor = String::new();
//! session.accept_answer(&answer_descriptor).await?;
//!
//! let channel = session.wait_until_ready(Duration::from_secs(30)).await?;
//! FileSender::default().send_path(&channel, "photo.jpg").await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod connection;
pub mod handshake;
pub mod receiver;
pub mod sender;
pub mod shortlink;
pub mod signaling;

// Re-exports for public API
pub use channel::{ChannelMessage, ChannelStats, DataChannel, DataChannelState};
pub use config::{PeerConfig, DEFAULT_CHANNEL_LABEL, DEFAULT_GATHERING_TIMEOUT_MS};
pub use connection::{ConnectionState, PeerConnection};
pub use dropwire_core::{Error, Result};
pub use handshake::{Handshake, HandshakeState, PeerSession, Role};
pub use receiver::{save_to_dir, FileReceiver};
pub use sender::{ChunkSink, FileSender, TransferSummary};
pub use shortlink::TokenClient;
pub use signaling::{SignalingClient, SignalingSender};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
