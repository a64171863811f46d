//! Sending side of the chunked transfer protocol
//!
//! A [`FileSender`] announces one metadata record, then streams the payload
//! as bounded binary chunks. Chunks are single-flight: each send completes
//! before the next chunk is read, so frames arrive in order and the
//! receiver's byte accounting lines up with ours.

use crate::channel::DataChannel;
use async_trait::async_trait;
use bytes::Bytes;
use dropwire_core::{Error, Result, TransferMetadata, TRANSFER_CHUNK_SIZE};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Progress hook invoked after every chunk with (bytes sent, total bytes)
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Destination for transfer frames
///
/// [`DataChannel`] is the real sink; tests substitute a recorder.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Deliver the metadata record that opens a transfer
    async fn send_metadata(&self, metadata: &TransferMetadata) -> Result<()>;

    /// Deliver one binary chunk
    async fn send_chunk(&self, chunk: Bytes) -> Result<()>;
}

#[async_trait]
impl ChunkSink for DataChannel {
    async fn send_metadata(&self, metadata: &TransferMetadata) -> Result<()> {
        self.send_text(&metadata.to_json()?).await
    }

    async fn send_chunk(&self, chunk: Bytes) -> Result<()> {
        self.send_binary(chunk).await
    }
}

/// Outcome of a completed send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// Name announced in the metadata record
    pub name: String,

    /// Total payload bytes delivered
    pub bytes_sent: u64,

    /// Number of binary chunks delivered
    pub chunks_sent: u64,
}

/// Streams files over a [`ChunkSink`] in bounded chunks
#[derive(Clone)]
pub struct FileSender {
    chunk_size: usize,
    on_progress: Option<ProgressCallback>,
}

impl Default for FileSender {
    fn default() -> Self {
        Self {
            chunk_size: TRANSFER_CHUNK_SIZE,
            on_progress: None,
        }
    }
}

impl FileSender {
    /// Create a sender with a custom chunk size
    ///
    /// The size must be positive and no larger than [`TRANSFER_CHUNK_SIZE`].
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_size > TRANSFER_CHUNK_SIZE {
            return Err(Error::InvalidConfig(format!(
                "Chunk size must be between 1 and {} bytes, got {}",
                TRANSFER_CHUNK_SIZE, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            on_progress: None,
        })
    }

    /// Chunk size this sender slices payloads into
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Install a progress hook
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Send a file from disk
    ///
    /// The announced name is the path's final component; the MIME type is
    /// the protocol default since nothing on disk declares one.
    pub async fn send_path<S>(&self, sink: &S, path: impl AsRef<Path>) -> Result<TransferSummary>
    where
        S: ChunkSink + ?Sized,
    {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::TransferError(format!("Path has no usable file name: {}", path.display()))
            })?
            .to_string();

        let mut file = fs::File::open(path).await?;
        let size = file.metadata().await?.len();

        let metadata = TransferMetadata::new(name.clone(), size, None);
        sink.send_metadata(&metadata).await?;
        debug!(name = %name, size, "Transfer announced");

        let mut buf = vec![0u8; self.chunk_size];
        let mut sent: u64 = 0;
        let mut chunks: u64 = 0;

        while sent < size {
            let take = (size - sent).min(self.chunk_size as u64) as usize;
            file.read_exact(&mut buf[..take]).await?;

            sink.send_chunk(Bytes::copy_from_slice(&buf[..take])).await?;
            sent += take as u64;
            chunks += 1;

            if let Some(callback) = &self.on_progress {
                callback(sent, size);
            }
        }

        info!(name = %name, bytes = sent, chunks, "Transfer sent");

        Ok(TransferSummary {
            name,
            bytes_sent: sent,
            chunks_sent: chunks,
        })
    }

    /// Send an in-memory payload
    pub async fn send_bytes<S>(
        &self,
        sink: &S,
        name: &str,
        mime_type: Option<String>,
        data: &[u8],
    ) -> Result<TransferSummary>
    where
        S: ChunkSink + ?Sized,
    {
        let size = data.len() as u64;

        let metadata = TransferMetadata::new(name, size, mime_type);
        sink.send_metadata(&metadata).await?;
        debug!(name = %name, size, "Transfer announced");

        let mut sent: u64 = 0;
        let mut chunks: u64 = 0;

        for chunk in data.chunks(self.chunk_size) {
            sink.send_chunk(Bytes::copy_from_slice(chunk)).await?;
            sent += chunk.len() as u64;
            chunks += 1;

            if let Some(callback) = &self.on_progress {
                callback(sent, size);
            }
        }

        info!(name = %name, bytes = sent, chunks, "Transfer sent");

        Ok(TransferSummary {
            name: name.to_string(),
            bytes_sent: sent,
            chunks_sent: chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, PartialEq)]
    enum SinkEvent {
        Metadata(TransferMetadata),
        Chunk(usize),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<SinkEvent>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<SinkEvent> {
            self.events.lock().unwrap().drain(..).collect()
        }
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn send_metadata(&self, metadata: &TransferMetadata) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push(SinkEvent::Metadata(metadata.clone()));
            Ok(())
        }

        async fn send_chunk(&self, chunk: Bytes) -> Result<()> {
            self.events.lock().unwrap().push(SinkEvent::Chunk(chunk.len()));
            Ok(())
        }
    }

    fn chunk_sizes(events: &[SinkEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Chunk(len) => Some(*len),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_chunk_size_bounds() {
        assert!(FileSender::new(0).is_err());
        assert!(FileSender::new(TRANSFER_CHUNK_SIZE + 1).is_err());
        assert!(FileSender::new(TRANSFER_CHUNK_SIZE).is_ok());
        assert_eq!(FileSender::default().chunk_size(), TRANSFER_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_metadata_precedes_chunks() {
        let sink = RecordingSink::default();
        let sender = FileSender::default();

        sender
            .send_bytes(&sink, "hello.txt", Some("text/plain".to_string()), b"hello")
            .await
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        match &events[0] {
            SinkEvent::Metadata(m) => {
                assert_eq!(m.name, "hello.txt");
                assert_eq!(m.size, 5);
                assert_eq!(m.mime_type, "text/plain");
            }
            other => panic!("expected metadata first, got {:?}", other),
        }
        assert_eq!(events[1], SinkEvent::Chunk(5));
    }

    #[tokio::test]
    async fn test_forty_thousand_bytes_chunk_into_three() {
        let sink = RecordingSink::default();
        let sender = FileSender::default();

        let data = vec![7u8; 40000];
        let summary = sender.send_bytes(&sink, "big.bin", None, &data).await.unwrap();

        assert_eq!(summary.bytes_sent, 40000);
        assert_eq!(summary.chunks_sent, 3);
        assert_eq!(chunk_sizes(&sink.events()), vec![16384, 16384, 7232]);
    }

    #[tokio::test]
    async fn test_zero_byte_payload_sends_metadata_only() {
        let sink = RecordingSink::default();
        let sender = FileSender::default();

        let summary = sender.send_bytes(&sink, "empty.txt", None, &[]).await.unwrap();

        assert_eq!(summary.bytes_sent, 0);
        assert_eq!(summary.chunks_sent, 0);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SinkEvent::Metadata(_)));
    }

    #[tokio::test]
    async fn test_custom_chunk_size_slices_exactly() {
        let sink = RecordingSink::default();
        let sender = FileSender::new(10).unwrap();

        sender.send_bytes(&sink, "f.bin", None, &[0u8; 25]).await.unwrap();

        assert_eq!(chunk_sizes(&sink.events()), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_send_path_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");

        let mut data = Vec::with_capacity(40000);
        for i in 0..40000u32 {
            data.push((i % 251) as u8);
        }
        std::fs::write(&path, &data).unwrap();

        let sink = RecordingSink::default();
        let sender = FileSender::default();
        let summary = sender.send_path(&sink, &path).await.unwrap();

        assert_eq!(summary.name, "payload.bin");
        assert_eq!(summary.bytes_sent, 40000);

        let events = sink.events();
        match &events[0] {
            SinkEvent::Metadata(m) => {
                assert_eq!(m.name, "payload.bin");
                assert_eq!(m.size, 40000);
                assert_eq!(m.mime_type, "application/octet-stream");
            }
            other => panic!("expected metadata first, got {:?}", other),
        }
        assert_eq!(chunk_sizes(&events), vec![16384, 16384, 7232]);
    }

    #[tokio::test]
    async fn test_missing_file_surfaces_io_error() {
        let sink = RecordingSink::default();
        let sender = FileSender::default();

        let err = sender
            .send_path(&sink, "/nonexistent/definitely-missing.bin")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_progress_reports_running_totals() {
        let sink = RecordingSink::default();
        let seen: Arc<Mutex<Vec<(u64, u64)>>> = Arc::new(Mutex::new(Vec::new()));

        let hook = Arc::clone(&seen);
        let sender = FileSender::default().with_progress(Arc::new(move |sent, total| {
            hook.lock().unwrap().push((sent, total));
        }));

        sender
            .send_bytes(&sink, "big.bin", None, &[0u8; 40000])
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(16384, 40000), (32768, 40000), (40000, 40000)]
        );
    }
}
