//! Combined relay server
//!
//! Runs the WebSocket signaling listener and the HTTP token endpoints as one
//! unit sharing a token store and a connection registry. Both listeners stop
//! on the same shutdown signal.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use dropwire_core::{Error, Result, TokenStore};

use crate::config::RelayConfig;
use crate::http::build_router;
use crate::registry::ConnectionRegistry;
use crate::ws::handle_connection;

/// The signaling relay plus token endpoints
pub struct RelayServer {
    config: RelayConfig,
    store: TokenStore,
    registry: ConnectionRegistry,
}

impl RelayServer {
    /// Create a server from a validated configuration
    pub fn new(config: RelayConfig) -> Result<Self> {
        config.validate()?;
        let store = TokenStore::with_ttl(config.token_ttl());
        Ok(Self {
            config,
            store,
            registry: ConnectionRegistry::new(),
        })
    }

    /// The token store backing the HTTP endpoints
    pub fn store(&self) -> TokenStore {
        self.store.clone()
    }

    /// The registry of open signaling connections
    pub fn registry(&self) -> ConnectionRegistry {
        self.registry.clone()
    }

    /// Bind both listeners and start serving
    ///
    /// Returns once the listeners are bound; serving continues in background
    /// tasks controlled through the returned handle. Binding port 0 and
    /// reading the handle's addresses gives tests a free port.
    pub async fn start(self) -> Result<RelayHandle> {
        let ws_listener = TcpListener::bind(&self.config.ws_addr)
            .await
            .map_err(|e| Error::SignalingError(format!("Failed to bind {}: {}", self.config.ws_addr, e)))?;
        let ws_addr = ws_listener
            .local_addr()
            .map_err(|e| Error::SignalingError(format!("Failed to read bound address: {}", e)))?;

        let http_listener = TcpListener::bind(&self.config.http_addr)
            .await
            .map_err(|e| Error::TokenStoreError(format!("Failed to bind {}: {}", self.config.http_addr, e)))?;
        let http_addr = http_listener
            .local_addr()
            .map_err(|e| Error::TokenStoreError(format!("Failed to read bound address: {}", e)))?;

        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        // Accept loop for signaling connections
        let registry = self.registry.clone();
        let mut ws_shutdown_rx = shutdown_tx.subscribe();
        let ws_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = ws_listener.accept() => {
                        match result {
                            Ok((stream, peer_addr)) => {
                                let registry = registry.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, registry).await {
                                        error!("Signaling connection error from {}: {}", peer_addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept signaling connection: {}", e);
                            }
                        }
                    }
                    _ = ws_shutdown_rx.recv() => {
                        info!("Signaling listener received shutdown signal");
                        break;
                    }
                }
            }
        });

        // Token endpoints with graceful shutdown on the same signal
        let router = build_router(self.store.clone());
        let mut http_shutdown_rx = shutdown_tx.subscribe();
        let http_task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = http_shutdown_rx.recv().await;
                info!("Token endpoints received shutdown signal");
            };
            if let Err(e) = axum::serve(http_listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Token endpoint server error: {}", e);
            }
        });

        info!("Signaling relay listening on ws://{}", ws_addr);
        info!("Token endpoints listening on http://{}", http_addr);

        Ok(RelayHandle {
            ws_addr,
            http_addr,
            shutdown_tx,
            store: self.store,
            registry: self.registry,
            ws_task,
            http_task,
        })
    }
}

/// Handle for a running relay server
pub struct RelayHandle {
    ws_addr: SocketAddr,
    http_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    store: TokenStore,
    registry: ConnectionRegistry,
    ws_task: JoinHandle<()>,
    http_task: JoinHandle<()>,
}

impl RelayHandle {
    /// Bound address of the signaling listener
    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    /// Bound address of the token endpoints
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// WebSocket URL clients should dial
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.ws_addr)
    }

    /// Base URL of the token endpoints
    pub fn http_url(&self) -> String {
        format!("http://{}", self.http_addr)
    }

    /// The shared token store
    pub fn store(&self) -> TokenStore {
        self.store.clone()
    }

    /// Number of currently-open signaling connections
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Stop both listeners and wait for their tasks to finish
    pub async fn shutdown(self) {
        info!("Shutting down relay server");
        let _ = self.shutdown_tx.send(());
        let _ = self.ws_task.await;
        let _ = self.http_task.await;
        info!("Relay server stopped");
    }
}
