//! Relay server binary entry point
//!
//! Starts the Dropwire signaling relay together with the short-link token
//! endpoints. Peers dial the WebSocket listener to exchange ICE candidates
//! and fetch offer/answer descriptors through the HTTP listener.
//!
//! # Usage
//!
//! ```bash
//! # Start with the default listeners (ws 0.0.0.0:9001, http 0.0.0.0:8080)
//! cargo run -p dropwire-relay-server
//!
//! # Custom listeners and a 5 minute token lifetime
//! cargo run -p dropwire-relay-server -- \
//!   --ws-address 0.0.0.0:9100 \
//!   --http-address 0.0.0.0:8100 \
//!   --token-ttl-secs 300
//! ```

use clap::Parser;
use dropwire_relay::{RelayConfig, RelayServer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Dropwire Relay Server
///
/// Signaling relay for peer-to-peer file transfer. Echoes offers and
/// answers back to their senders, broadcasts ICE candidates to the other
/// connected peers, and serves one-time short links for descriptors.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket signaling listener address
    #[arg(long, default_value = "0.0.0.0:9001", env = "DROPWIRE_WS_ADDRESS")]
    ws_address: String,

    /// HTTP token endpoint listener address
    #[arg(long, default_value = "0.0.0.0:8080", env = "DROPWIRE_HTTP_ADDRESS")]
    http_address: String,

    /// Seconds an unconsumed descriptor token stays retrievable
    #[arg(long, default_value_t = 600, env = "DROPWIRE_TOKEN_TTL_SECS")]
    token_ttl_secs: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up Ctrl+C handler at the very start
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Ctrl+C received! Initiating shutdown...");

        let was_already_set = shutdown_flag_handler.swap(true, Ordering::SeqCst);
        if was_already_set {
            eprintln!("   [SIGNAL] ⚠️  Shutdown already in progress, forcing immediate exit");
            std::process::exit(0);
        }

        // Give it a moment for graceful shutdown
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_secs(3));
            eprintln!("⚠️  [WATCHDOG] Graceful shutdown timeout (3s), forcing exit");
            std::process::exit(0);
        });
    })
    .expect("Failed to set Ctrl+C handler");

    // Create multi-threaded tokio runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("relay-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(
    args: Args,
    shutdown_flag: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Dropwire relay server starting"
    );

    let config = RelayConfig::new()
        .with_ws_addr(&args.ws_address)
        .with_http_addr(&args.http_address)
        .with_token_ttl_secs(args.token_ttl_secs);

    info!(
        ws_address = %config.ws_addr,
        http_address = %config.http_addr,
        token_ttl_secs = args.token_ttl_secs,
        "Configuration loaded"
    );

    let handle = RelayServer::new(config)?.start().await?;

    info!("Server running. Press Ctrl+C to shutdown.");

    while !shutdown_flag.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }

    info!("Shutdown signal received, cleaning up...");

    handle.shutdown().await;
    info!("Relay server shut down gracefully");

    Ok(())
}

fn init_tracing() {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
