//! Chunked file transfer framing
//!
//! One JSON metadata record followed by binary chunks, no end-of-stream
//! marker. The receiver infers completion purely from byte accounting:
//! when the running total of chunk lengths equals the declared size, the
//! chunks are concatenated and handed back as one artifact.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Maximum size of a single binary chunk
pub const TRANSFER_CHUNK_SIZE: usize = 16 * 1024;

/// MIME type assumed when the sender does not know one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// File metadata announced before the first chunk
///
/// Serializes as `{"type":"metadata","name":...,"size":...,"mimeType":...}`,
/// the shape browser receivers expect on the data channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename = "metadata", rename_all = "camelCase")]
pub struct TransferMetadata {
    /// File name as presented to the receiver
    pub name: String,

    /// Total payload size in bytes
    pub size: u64,

    /// MIME type of the payload
    pub mime_type: String,
}

impl TransferMetadata {
    /// Create a metadata record, substituting the default MIME type when
    /// none is known
    pub fn new(name: impl Into<String>, size: u64, mime_type: Option<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            Error::SerializationError(format!("Failed to serialize transfer metadata: {}", e))
        })
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Error::SerializationError(format!("Failed to deserialize transfer metadata: {}", e))
        })
    }
}

/// Receiver-side assembly state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveState {
    /// No metadata seen yet; binary frames are dropped
    AwaitingMetadata,
    /// Metadata seen; accumulating chunks
    Receiving,
}

/// A fully reassembled file
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFile {
    /// Declared file name
    pub name: String,

    /// Declared MIME type
    pub mime_type: String,

    /// Reassembled payload
    pub data: Bytes,
}

/// Reassembles one file at a time from a metadata record plus binary chunks
///
/// A string message always (re)starts a transfer: counters and buffers reset
/// to the new declaration. Completion fires exactly once, on the chunk that
/// makes the running total equal the declared size, and the assembler resets
/// for a possible next file. A sender overshooting its declared size never
/// triggers completion.
pub struct TransferAssembler {
    state: ReceiveState,
    metadata: Option<TransferMetadata>,
    buffers: Vec<Bytes>,
    received: u64,
}

impl Default for TransferAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferAssembler {
    /// Create an assembler awaiting its first metadata record
    pub fn new() -> Self {
        Self {
            state: ReceiveState::AwaitingMetadata,
            metadata: None,
            buffers: Vec::new(),
            received: 0,
        }
    }

    /// Current assembly state
    pub fn state(&self) -> ReceiveState {
        self.state
    }

    /// Bytes accumulated toward the current declaration
    pub fn bytes_received(&self) -> u64 {
        self.received
    }

    /// Declared size of the in-flight transfer, if any
    pub fn declared_size(&self) -> Option<u64> {
        self.metadata.as_ref().map(|m| m.size)
    }

    /// Handle a string message: parse it as metadata and reset accumulation
    ///
    /// A zero-size declaration completes immediately since the running total
    /// already equals the declared size. Unparseable text is rejected without
    /// touching the current state.
    pub fn on_text(&mut self, text: &str) -> Result<Option<ReceivedFile>> {
        let metadata = TransferMetadata::from_json(text)?;
        debug!(
            name = %metadata.name,
            size = metadata.size,
            mime_type = %metadata.mime_type,
            "Transfer announced"
        );

        self.buffers.clear();
        self.received = 0;

        if metadata.size == 0 {
            self.state = ReceiveState::AwaitingMetadata;
            self.metadata = None;
            return Ok(Some(ReceivedFile {
                name: metadata.name,
                mime_type: metadata.mime_type,
                data: Bytes::new(),
            }));
        }

        self.state = ReceiveState::Receiving;
        self.metadata = Some(metadata);
        Ok(None)
    }

    /// Handle a binary chunk, returning the reassembled file on completion
    pub fn on_binary(&mut self, chunk: Bytes) -> Result<Option<ReceivedFile>> {
        let metadata = match (&self.state, &self.metadata) {
            (ReceiveState::Receiving, Some(metadata)) => metadata,
            _ => {
                warn!(
                    len = chunk.len(),
                    "Dropping binary chunk received before metadata"
                );
                return Ok(None);
            }
        };

        self.received += chunk.len() as u64;
        self.buffers.push(chunk);

        if self.received == metadata.size {
            let metadata = self
                .metadata
                .take()
                .ok_or_else(|| Error::InternalError("metadata vanished mid-assembly".to_string()))?;

            let mut data = BytesMut::with_capacity(self.received as usize);
            for buffer in self.buffers.drain(..) {
                data.extend_from_slice(&buffer);
            }
            self.received = 0;
            self.state = ReceiveState::AwaitingMetadata;

            debug!(name = %metadata.name, size = metadata.size, "Transfer complete");
            return Ok(Some(ReceivedFile {
                name: metadata.name,
                mime_type: metadata.mime_type,
                data: data.freeze(),
            }));
        }

        if self.received > metadata.size {
            warn!(
                received = self.received,
                declared = metadata.size,
                "Received more bytes than declared; transfer will not complete"
            );
        }

        Ok(None)
    }
}
