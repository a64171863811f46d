//! Shared building blocks for dropwire peers and relays
//!
//! Everything both halves of a transfer agree on lives here: the signaling
//! wire protocol, the ephemeral token store backing short links, and the
//! metadata-plus-chunks framing used on the data channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ClientSignal / ServerSignal   ┌──────────────┐
//! │  dropwire-   │ ◄─────────────────────────────► │  dropwire-   │
//! │    peer      │                                 │    relay     │
//! └──────┬───────┘        TokenStore (HTTP)        └──────┬───────┘
//!        │         short-link store / consume             │
//!        │                                                │
//!        └── TransferMetadata + chunks ── data channel ───┘
//! ```
//!
//! # Example
//!
//! Reassembling a transfer from its framing:
//!
//! ```
//! use bytes::Bytes;
//! use dropwire_core::{TransferAssembler, TransferMetadata};
//!
//! let mut assembler = TransferAssembler::new();
//! let metadata = TransferMetadata::new("hello.txt", 5, None);
//! assembler.on_text(&metadata.to_json().unwrap()).unwrap();
//!
//! let file = assembler
//!     .on_binary(Bytes::from_static(b"hello"))
//!     .unwrap()
//!     .expect("final chunk completes the transfer");
//! assert_eq!(file.name, "hello.txt");
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod signal;
pub mod token;
pub mod transfer;

// Re-export the shared vocabulary at the crate root
pub use error::{Error, Result};
pub use signal::{CandidatePayload, ClientSignal, SdpPayload, ServerSignal};
pub use token::{TokenStore, DEFAULT_TOKEN_TTL, TOKEN_ID_LEN};
pub use transfer::{
    ReceiveState, ReceivedFile, TransferAssembler, TransferMetadata, DEFAULT_MIME_TYPE,
    TRANSFER_CHUNK_SIZE,
};

/// Get the crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
