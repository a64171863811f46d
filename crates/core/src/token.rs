//! Ephemeral one-time token store
//!
//! Maps short generated identifiers to opaque payloads (serialized session
//! descriptions) with a per-entry TTL. An identifier resolves at most once:
//! the first `consume` deletes the entry, and entries that outlive their TTL
//! are removed by a per-entry expiry task. Everything lives in process
//! memory; a restart discards all tokens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::{Error, Result};

/// Default time-to-live for stored tokens (10 minutes)
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(600);

/// Length of generated token identifiers
pub const TOKEN_ID_LEN: usize = 10;

struct TokenEntry {
    payload: String,
    expires_at: Instant,
}

/// In-memory one-time token store with per-entry TTL
#[derive(Clone)]
pub struct TokenStore {
    entries: Arc<RwLock<HashMap<String, TokenEntry>>>,
    ttl: Duration,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore {
    /// Create a store with the default TTL
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TOKEN_TTL)
    }

    /// Create a store with a custom TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// The TTL applied to newly stored tokens
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a payload and return its generated identifier
    ///
    /// The identifier is guaranteed unique among live entries. Deletion is
    /// scheduled for `now + ttl`; consuming the token earlier cancels nothing
    /// but leaves the expiry task with no entry to remove.
    pub async fn store(&self, payload: impl Into<String>) -> String {
        let payload = payload.into();
        let expires_at = Instant::now() + self.ttl;

        let id = {
            let mut entries = self.entries.write().await;
            let mut id = generate_id();
            while entries.contains_key(&id) {
                id = generate_id();
            }
            entries.insert(
                id.clone(),
                TokenEntry {
                    payload,
                    expires_at,
                },
            );
            id
        };

        debug!(id = %id, ttl_secs = self.ttl.as_secs(), "Stored token");

        // Per-entry expiry task. The expires_at guard keeps it from deleting
        // a later entry that reused this id after consumption.
        let entries = Arc::clone(&self.entries);
        let expiry_id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let mut entries = entries.write().await;
            if let Some(entry) = entries.get(&expiry_id) {
                if entry.expires_at <= Instant::now() {
                    entries.remove(&expiry_id);
                    debug!(id = %expiry_id, "Token expired");
                }
            }
        });

        id
    }

    /// Return the payload and delete the entry, atomically
    ///
    /// The check and the delete happen under one write lock, so of two
    /// concurrent consumers exactly one succeeds. Unknown and expired
    /// identifiers are indistinguishable to the caller.
    pub async fn consume(&self, id: &str) -> Result<String> {
        let mut entries = self.entries.write().await;
        match entries.remove(id) {
            Some(entry) if entry.expires_at > Instant::now() => {
                debug!(id = %id, "Consumed token");
                Ok(entry.payload)
            }
            Some(_) => {
                debug!(id = %id, "Rejected consume of expired token");
                Err(Error::TokenNotFound(id.to_string()))
            }
            None => Err(Error::TokenNotFound(id.to_string())),
        }
    }

    /// Look up a payload without deleting the entry
    ///
    /// Backs the reveal page: a link preview or QR scan may open the page
    /// without burning the one-time token. Expired entries read as absent.
    pub async fn peek(&self, id: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.payload.clone())
    }

    /// Whether an identifier currently resolves
    pub async fn contains(&self, id: &str) -> bool {
        self.peek(id).await.is_some()
    }

    /// Number of live entries (expired-but-unswept entries included)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_ID_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_consume() {
        let store = TokenStore::new();
        let id = store.store("OFFER_SDP_X").await;
        assert_eq!(id.len(), TOKEN_ID_LEN);

        let payload = store.consume(&id).await.unwrap();
        assert_eq!(payload, "OFFER_SDP_X");
    }

    #[tokio::test]
    async fn test_second_consume_fails() {
        let store = TokenStore::new();
        let id = store.store("payload").await;

        store.consume(&id).await.unwrap();
        let err = store.consume(&id).await.unwrap_err();
        assert!(matches!(err, Error::TokenNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_id_fails() {
        let store = TokenStore::new();
        let err = store.consume("nosuchid00").await.unwrap_err();
        assert!(matches!(err, Error::TokenNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_after_ttl_fails() {
        let store = TokenStore::with_ttl(Duration::from_secs(60));
        let id = store.store("payload").await;

        tokio::time::sleep(Duration::from_secs(61)).await;

        let err = store.consume(&id).await.unwrap_err();
        assert!(matches!(err, Error::TokenNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_task_removes_entry() {
        let store = TokenStore::with_ttl(Duration::from_secs(60));
        let _id = store.store("payload").await;
        assert_eq!(store.len().await, 1);

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_just_before_ttl_succeeds() {
        let store = TokenStore::with_ttl(Duration::from_secs(60));
        let id = store.store("payload").await;

        tokio::time::sleep(Duration::from_secs(59)).await;

        assert_eq!(store.consume(&id).await.unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_peek_does_not_consume() {
        let store = TokenStore::new();
        let id = store.store("payload").await;

        assert_eq!(store.peek(&id).await.as_deref(), Some("payload"));
        assert_eq!(store.peek(&id).await.as_deref(), Some("payload"));
        assert!(store.contains(&id).await);

        assert_eq!(store.consume(&id).await.unwrap(), "payload");
        assert_eq!(store.peek(&id).await, None);
        assert!(!store.contains(&id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_expired_reads_absent() {
        let store = TokenStore::with_ttl(Duration::from_secs(60));
        let id = store.store("payload").await;

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(store.peek(&id).await, None);
    }

    #[tokio::test]
    async fn test_generated_ids_are_unique() {
        let store = TokenStore::new();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            ids.insert(store.store("x").await);
        }
        assert_eq!(ids.len(), 100);
        assert_eq!(store.len().await, 100);
    }

    #[tokio::test]
    async fn test_concurrent_consume_single_winner() {
        let store = TokenStore::new();
        let id = store.store("payload").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move { store.consume(&id).await }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }
}
