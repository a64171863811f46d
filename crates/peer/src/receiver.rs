//! Receiving side of the chunked transfer protocol
//!
//! [`FileReceiver`] hooks a data channel's message stream into a
//! [`TransferAssembler`] and yields each reassembled file as it completes.
//! Saving to disk strips any directory components from the declared name
//! so a remote peer cannot steer the write outside the target directory.

use crate::channel::{ChannelMessage, DataChannel};
use dropwire_core::{ReceivedFile, Result, TransferAssembler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Name used when a transfer declares nothing usable as a file name
const FALLBACK_FILE_NAME: &str = "download.bin";

/// Reassembles inbound transfers from a data channel
pub struct FileReceiver {
    assembler: Arc<Mutex<TransferAssembler>>,
    files: mpsc::UnboundedReceiver<ReceivedFile>,
}

impl FileReceiver {
    /// Attach to a channel, replacing any previous message handler
    pub fn attach(channel: &DataChannel) -> Self {
        let assembler = Arc::new(Mutex::new(TransferAssembler::new()));
        let (files_tx, files_rx) = mpsc::unbounded_channel();

        let handler_assembler = Arc::clone(&assembler);
        channel.on_message(move |message| {
            let assembler = Arc::clone(&handler_assembler);
            let files = files_tx.clone();
            async move {
                ingest(&assembler, &files, message).await;
            }
        });

        Self {
            assembler,
            files: files_rx,
        }
    }

    /// Wait for the next completed file
    ///
    /// Returns `None` once the channel side of the pipeline is gone.
    pub async fn next_file(&mut self) -> Option<ReceivedFile> {
        self.files.recv().await
    }

    /// Progress of the in-flight transfer as (received, declared) bytes
    ///
    /// The declared size is `None` between transfers.
    pub async fn progress(&self) -> (u64, Option<u64>) {
        let assembler = self.assembler.lock().await;
        (assembler.bytes_received(), assembler.declared_size())
    }
}

/// Feed one channel message through the assembler
async fn ingest(
    assembler: &Mutex<TransferAssembler>,
    files: &mpsc::UnboundedSender<ReceivedFile>,
    message: ChannelMessage,
) {
    let completed = match message {
        ChannelMessage::Text(text) => match assembler.lock().await.on_text(&text) {
            Ok(completed) => completed,
            Err(e) => {
                warn!("Ignoring text frame that is not transfer metadata: {}", e);
                return;
            }
        },
        ChannelMessage::Binary(chunk) => match assembler.lock().await.on_binary(chunk) {
            Ok(completed) => completed,
            Err(e) => {
                warn!("Chunk assembly failed: {}", e);
                return;
            }
        },
    };

    if let Some(file) = completed {
        info!(name = %file.name, size = file.data.len(), "File reassembled");
        if files.send(file).is_err() {
            debug!("Receiver dropped, discarding completed file");
        }
    }
}

/// Write a received file into `dir`, returning the path written
///
/// The declared name is reduced to its final path component; names with
/// no usable component become `download.bin`.
pub async fn save_to_dir(file: &ReceivedFile, dir: impl AsRef<Path>) -> Result<PathBuf> {
    let path = dir.as_ref().join(sanitize_file_name(&file.name));
    fs::write(&path, &file.data).await?;

    info!(path = %path.display(), size = file.data.len(), "File saved");
    Ok(path)
}

fn sanitize_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}
