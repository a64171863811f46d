//! Signaling relay and token endpoints for dropwire
//!
//! The relay is a broadcast bus, not a matchmaker: offers and answers are
//! echoed back to whoever submitted them (the submitter turns the echo into
//! a shareable token), and ICE candidates are flooded to every other open
//! connection. The HTTP side exposes the ephemeral token store used for
//! short links, with a reveal page that keeps one-time tokens alive through
//! QR scans and link previews.
//!
//! # Example
//!
//! ```no_run
//! use dropwire_relay::{RelayConfig, RelayServer};
//!
//! async fn run() -> dropwire_core::Result<()> {
//!     let config = RelayConfig::new()
//!         .with_ws_addr("0.0.0.0:9001")
//!         .with_http_addr("0.0.0.0:8080");
//!     let handle = RelayServer::new(config)?.start().await?;
//!     println!("relay on {}", handle.ws_url());
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod http;
pub mod registry;
pub mod server;
pub mod ws;

pub use config::RelayConfig;
pub use http::build_router;
pub use registry::ConnectionRegistry;
pub use server::{RelayHandle, RelayServer};

/// Get the crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
