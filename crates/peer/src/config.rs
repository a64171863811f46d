//! Configuration for the peer handshake and transfer client

use dropwire_core::{Error, Result, TRANSFER_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default bound on the initial ICE gathering wait, in milliseconds.
///
/// Gathering that has not completed by then is not an error; the offer or
/// answer is sent with whatever candidates exist and the rest trickle.
pub const DEFAULT_GATHERING_TIMEOUT_MS: u64 = 3_000;

/// Default label for the file transfer data channel
pub const DEFAULT_CHANNEL_LABEL: &str = "file-transfer";

/// Configuration for a [`PeerSession`](crate::PeerSession)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Relay WebSocket URL (ws:// or wss://)
    pub signaling_url: String,

    /// Base URL of the short-link token endpoints (http:// or https://)
    pub shortlink_base: String,

    /// STUN server URLs. May be empty for link-local setups where host
    /// candidates are sufficient.
    pub stun_servers: Vec<String>,

    /// Upper bound on the initial ICE gathering wait, in milliseconds
    pub gathering_timeout_ms: u64,

    /// Maximum binary chunk size for file transfer, in bytes
    pub chunk_size: usize,

    /// Label assigned to the negotiated data channel
    pub channel_label: String,

    /// Gather loopback ICE candidates. Off for real deployments; used by
    /// same-host setups and tests.
    pub include_loopback: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://127.0.0.1:9001".to_string(),
            shortlink_base: "http://127.0.0.1:8080".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            gathering_timeout_ms: DEFAULT_GATHERING_TIMEOUT_MS,
            chunk_size: TRANSFER_CHUNK_SIZE,
            channel_label: DEFAULT_CHANNEL_LABEL.to_string(),
            include_loopback: false,
        }
    }
}

impl PeerConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a WebSocket URL
    /// - `shortlink_base` is not an HTTP URL
    /// - `gathering_timeout_ms` is zero
    /// - `chunk_size` is zero or exceeds the protocol maximum
    /// - `channel_label` is empty
    pub fn validate(&self) -> Result<()> {
        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if !self.shortlink_base.starts_with("http://")
            && !self.shortlink_base.starts_with("https://")
        {
            return Err(Error::InvalidConfig(format!(
                "shortlink_base must start with http:// or https://, got {}",
                self.shortlink_base
            )));
        }

        if self.gathering_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "gathering_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.chunk_size == 0 || self.chunk_size > TRANSFER_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "chunk_size must be in range 1-{}, got {}",
                TRANSFER_CHUNK_SIZE, self.chunk_size
            )));
        }

        if self.channel_label.is_empty() {
            return Err(Error::InvalidConfig(
                "channel_label must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// ICE gathering wait bound as a [`Duration`]
    pub fn gathering_timeout(&self) -> Duration {
        Duration::from_millis(self.gathering_timeout_ms)
    }

    /// Set the relay WebSocket URL
    pub fn with_signaling_url(mut self, url: &str) -> Self {
        self.signaling_url = url.to_string();
        self
    }

    /// Set the short-link base URL
    pub fn with_shortlink_base(mut self, url: &str) -> Self {
        self.shortlink_base = url.to_string();
        self
    }

    /// Replace the STUN server list
    pub fn with_stun_servers(mut self, servers: Vec<String>) -> Self {
        self.stun_servers = servers;
        self
    }

    /// Set the ICE gathering wait bound in milliseconds
    pub fn with_gathering_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.gathering_timeout_ms = timeout_ms;
        self
    }

    /// Set the maximum binary chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the data channel label
    pub fn with_channel_label(mut self, label: &str) -> Self {
        self.channel_label = label.to_string();
        self
    }

    /// Enable or disable loopback candidate gathering
    pub fn with_include_loopback(mut self, include: bool) -> Self {
        self.include_loopback = include;
        self
    }

    /// Preset for two peers on the same host: no STUN round trips, loopback
    /// candidates enabled, and a short gathering wait.
    pub fn local_preset(signaling_url: &str, shortlink_base: &str) -> Self {
        Self {
            signaling_url: signaling_url.to_string(),
            shortlink_base: shortlink_base.to_string(),
            stun_servers: Vec::new(),
            gathering_timeout_ms: 1_000,
            include_loopback: true,
            ..Self::default()
        }
    }
}
