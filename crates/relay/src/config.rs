//! Relay server configuration

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dropwire_core::{Error, Result};

/// Configuration for the signaling relay and token endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Bind address for the WebSocket signaling listener
    pub ws_addr: String,

    /// Bind address for the HTTP token endpoints
    pub http_addr: String,

    /// Time-to-live for stored tokens, in seconds
    pub token_ttl_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ws_addr: "0.0.0.0:9001".to_string(),
            http_addr: "0.0.0.0:8080".to_string(),
            token_ttl_secs: 600,
        }
    }
}

impl RelayConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the WebSocket bind address
    pub fn with_ws_addr(mut self, addr: impl Into<String>) -> Self {
        self.ws_addr = addr.into();
        self
    }

    /// Set the HTTP bind address
    pub fn with_http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Set the token TTL in seconds
    pub fn with_token_ttl_secs(mut self, secs: u64) -> Self {
        self.token_ttl_secs = secs;
        self
    }

    /// Token TTL as a Duration
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.ws_addr
            .parse::<SocketAddr>()
            .map_err(|e| Error::InvalidConfig(format!("ws_addr '{}': {}", self.ws_addr, e)))?;

        self.http_addr
            .parse::<SocketAddr>()
            .map_err(|e| Error::InvalidConfig(format!("http_addr '{}': {}", self.http_addr, e)))?;

        if self.token_ttl_secs == 0 {
            return Err(Error::InvalidConfig(
                "token_ttl_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn test_builder_chain() {
        let config = RelayConfig::new()
            .with_ws_addr("127.0.0.1:0")
            .with_http_addr("127.0.0.1:0")
            .with_token_ttl_secs(30);

        assert!(config.validate().is_ok());
        assert_eq!(config.ws_addr, "127.0.0.1:0");
        assert_eq!(config.token_ttl_secs, 30);
    }

    #[test]
    fn test_invalid_ws_addr_rejected() {
        let config = RelayConfig::new().with_ws_addr("not-an-address");
        let err = config.validate().unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_invalid_http_addr_rejected() {
        let config = RelayConfig::new().with_http_addr("localhost:http");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = RelayConfig::new().with_token_ttl_secs(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let config = RelayConfig::new().with_token_ttl_secs(120);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RelayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.token_ttl_secs, 120);
        assert_eq!(parsed.ws_addr, config.ws_addr);
    }
}
