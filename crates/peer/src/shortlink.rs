//! Short-link token client and raw descriptor fallback
//!
//! Session descriptions travel out-of-band as either a short reveal link
//! backed by the token store, or, when the store is unreachable, as the
//! URL-safe base64 of the description itself. [`decode_descriptor`] and
//! [`extract_short_id`] accept both shapes plus pasted reveal URLs, so a
//! peer can hand any of them to the session unmodified.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use dropwire_core::{Error, Result, SdpPayload};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct StoreRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct StoreResponse {
    id: String,
}

#[derive(Deserialize)]
struct ConsumeResponse {
    token: String,
}

/// HTTP client for the token store endpoints
#[derive(Debug, Clone)]
pub struct TokenClient {
    /// Base URL without trailing slash
    base_url: String,
    /// Shared HTTP client
    http: reqwest::Client,
}

impl TokenClient {
    /// Create a client for the store at `base_url`
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Store a token payload, returning its short identifier
    pub async fn shorten(&self, token: &str) -> Result<String> {
        let url = format!("{}/store", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(&StoreRequest { token })
            .send()
            .await
            .map_err(|e| Error::TokenStoreError(format!("Store request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::TokenStoreError(format!(
                "Store request rejected: {}",
                response.status()
            )));
        }

        let body: StoreResponse = response
            .json()
            .await
            .map_err(|e| Error::TokenStoreError(format!("Invalid store response: {}", e)))?;

        debug!("Stored token under id {}", body.id);

        Ok(body.id)
    }

    /// Consume a token by identifier
    ///
    /// The store deletes the entry on success; a second call with the same
    /// identifier returns [`Error::TokenNotFound`], as does an expired or
    /// never-issued identifier.
    pub async fn resolve_id(&self, id: &str) -> Result<String> {
        let url = format!("{}/consume/{}", self.base_url, id);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::TokenStoreError(format!("Consume request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::TokenNotFound(id.to_string()));
        }

        if !response.status().is_success() {
            return Err(Error::TokenStoreError(format!(
                "Consume request rejected: {}",
                response.status()
            )));
        }

        let body: ConsumeResponse = response
            .json()
            .await
            .map_err(|e| Error::TokenStoreError(format!("Invalid consume response: {}", e)))?;

        Ok(body.token)
    }

    /// Reveal page URL for a short identifier
    pub fn reveal_url(&self, id: &str) -> String {
        format!("{}/t/{}", self.base_url, id)
    }

    /// The store base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Encode a session description as a raw shareable string
///
/// Used when the token store is unreachable. The result is larger than a
/// short link but carries the description without any server round trip.
pub fn encode_descriptor(desc: &SdpPayload) -> Result<String> {
    let json = serde_json::to_string(desc).map_err(|e| {
        Error::SerializationError(format!("Failed to serialize description: {}", e))
    })?;

    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Try to decode a raw shareable string back into a session description
///
/// Returns `None` when the input is not base64 or does not decode to a
/// description, which is how short identifiers and reveal URLs fall
/// through to the token store path.
pub fn decode_descriptor(input: &str) -> Option<SdpPayload> {
    let bytes = URL_SAFE_NO_PAD.decode(input.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Extract the short identifier from pasted input
///
/// Accepts a bare identifier, a reveal URL (`.../t/<id>`), or any URL whose
/// last path segment is the identifier.
pub fn extract_short_id(input: &str) -> &str {
    let trimmed = input.trim().trim_end_matches('/');

    if let Some(pos) = trimmed.rfind("/t/") {
        return &trimmed[pos + 3..];
    }

    if trimmed.contains("://") {
        if let Some(pos) = trimmed.rfind('/') {
            return &trimmed[pos + 1..];
        }
    }

    trimmed
}
