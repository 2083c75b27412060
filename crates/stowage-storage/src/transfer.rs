//! Streaming transfer helpers
//!
//! Uploads and downloads move through `AsyncRead`/`Stream` wrappers that count
//! bytes as chunks pass and log a progress line each time another 5 % of the
//! total has gone through. Progress is advisory; nothing depends on it.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};

use crate::traits::{ByteReader, ByteStream, StorageError, StorageResult};

/// Minimum percentage between two progress events
pub const PROGRESS_STEP_PERCENT: u8 = 5;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl Display for TransferDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TransferDirection::Upload => write!(f, "upload"),
            TransferDirection::Download => write!(f, "download"),
        }
    }
}

/// A progress threshold crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub percent: u8,
    pub done_bytes: u64,
    pub total_bytes: u64,
}

impl Display for ProgressEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}% - {:.2}MB / {:.2}MB",
            self.percent,
            self.done_bytes as f64 / BYTES_PER_MB,
            self.total_bytes as f64 / BYTES_PER_MB
        )
    }
}

/// Byte accounting for one transfer
#[derive(Debug, Clone)]
pub struct TransferProgress {
    total: Option<u64>,
    done: u64,
    last_reported: u8,
    step: u8,
}

impl TransferProgress {
    /// Track a transfer of `total` bytes; no events are produced when unknown
    pub fn new(total: Option<u64>) -> Self {
        Self::with_step(total, PROGRESS_STEP_PERCENT)
    }

    pub fn with_step(total: Option<u64>, step: u8) -> Self {
        Self {
            total,
            done: 0,
            last_reported: 0,
            step: step.clamp(1, 100),
        }
    }

    /// Account for `bytes` more; returns an event when the next threshold
    /// (or completion) is reached.
    pub fn record(&mut self, bytes: usize) -> Option<ProgressEvent> {
        self.done += bytes as u64;

        let total = self.total.filter(|total| *total > 0)?;
        let percent = (self.done.min(total) * 100 / total) as u8;

        let crossed_step = u16::from(percent) >= u16::from(self.last_reported) + u16::from(self.step);
        let finished = percent == 100 && self.last_reported < 100;
        if !crossed_step && !finished {
            return None;
        }

        self.last_reported = percent;
        Some(ProgressEvent {
            percent,
            done_bytes: self.done,
            total_bytes: total,
        })
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.done
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }
}

fn log_progress(direction: TransferDirection, key: &str, event: &ProgressEvent) {
    tracing::info!(
        direction = %direction,
        key = %key,
        percent = event.percent,
        "{}",
        event
    );
}

/// `AsyncRead` wrapper that logs progress as bytes are read
pub struct ProgressReader<R> {
    inner: R,
    progress: TransferProgress,
    direction: TransferDirection,
    key: String,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, total: Option<u64>, direction: TransferDirection, key: &str) -> Self {
        Self {
            inner,
            progress: TransferProgress::new(total),
            direction,
            key: key.to_string(),
        }
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.progress.bytes_transferred()
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &poll {
            let read = buf.filled().len() - before;
            if read > 0 {
                if let Some(event) = this.progress.record(read) {
                    log_progress(this.direction, &this.key, &event);
                }
            }
        }

        poll
    }
}

/// `Stream` wrapper that logs progress as chunks pass
pub struct ProgressStream<S> {
    inner: S,
    progress: TransferProgress,
    direction: TransferDirection,
    key: String,
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, total: Option<u64>, direction: TransferDirection, key: &str) -> Self {
        Self {
            inner,
            progress: TransferProgress::new(total),
            direction,
            key: key.to_string(),
        }
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.progress.bytes_transferred()
    }
}

impl<S, E> Stream for ProgressStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let poll = this.inner.poll_next_unpin(cx);

        if let Poll::Ready(Some(Ok(chunk))) = &poll {
            if let Some(event) = this.progress.record(chunk.len()) {
                log_progress(this.direction, &this.key, &event);
            }
        }

        poll
    }
}

/// Reader over an in-memory buffer
pub fn reader_from_bytes(data: impl Into<Bytes>) -> ByteReader {
    Box::pin(std::io::Cursor::new(data.into()))
}

/// Open a local file as an upload source with progress logging.
///
/// Returns the reader and the file size.
pub async fn open_upload(path: &Path, key: &str) -> StorageResult<(ByteReader, u64)> {
    let file = fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    let reader = ProgressReader::new(file, Some(size), TransferDirection::Upload, key);
    Ok((Box::pin(reader), size))
}

/// Write a downloaded stream to `path`, returning the number of bytes written
pub async fn write_stream_to_path(
    stream: ByteStream,
    path: &Path,
    total: Option<u64>,
    key: &str,
) -> StorageResult<u64> {
    let mut stream = ProgressStream::new(stream, total, TransferDirection::Download, key);

    let mut file = fs::File::create(path).await.map_err(|e| {
        StorageError::DownloadFailed(format!("Failed to create file {}: {}", path.display(), e))
    })?;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;
    }

    file.flush().await?;
    Ok(stream.bytes_transferred())
}

/// Collect a downloaded stream into memory
pub async fn collect_stream(
    stream: ByteStream,
    total: Option<u64>,
    key: &str,
) -> StorageResult<Bytes> {
    let capacity = total.unwrap_or(0).min(64 * 1024 * 1024) as usize;
    let mut buffer = BytesMut::with_capacity(capacity);
    let mut stream = ProgressStream::new(stream, total, TransferDirection::Download, key);

    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }

    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_progress_reports_every_five_percent() {
        let mut progress = TransferProgress::new(Some(100));
        let events: Vec<u8> = (0..100)
            .filter_map(|_| progress.record(1))
            .map(|e| e.percent)
            .collect();
        assert_eq!(
            events,
            (1..=20).map(|i| i * 5).collect::<Vec<u8>>()
        );
        assert_eq!(progress.bytes_transferred(), 100);
    }

    #[test]
    fn test_large_chunks_skip_thresholds() {
        let mut progress = TransferProgress::new(Some(1000));
        assert_eq!(progress.record(30), None);
        assert_eq!(progress.record(40).map(|e| e.percent), Some(7));
        assert_eq!(progress.record(20), None);
        assert_eq!(progress.record(900).map(|e| e.percent), Some(99));
        assert_eq!(progress.record(10).map(|e| e.percent), Some(100));
        assert_eq!(progress.record(10), None);
    }

    #[test]
    fn test_unknown_total_never_reports() {
        let mut progress = TransferProgress::new(None);
        assert_eq!(progress.record(1 << 20), None);
        let mut empty = TransferProgress::new(Some(0));
        assert_eq!(empty.record(10), None);
        assert_eq!(empty.bytes_transferred(), 10);
    }

    #[test]
    fn test_event_display() {
        let event = ProgressEvent {
            percent: 25,
            done_bytes: 1024 * 1024,
            total_bytes: 4 * 1024 * 1024,
        };
        assert_eq!(event.to_string(), "25% - 1.00MB / 4.00MB");
    }

    #[tokio::test]
    async fn test_progress_reader_counts_bytes() {
        let data = vec![7u8; 10_000];
        let mut reader = ProgressReader::new(
            std::io::Cursor::new(data.clone()),
            Some(data.len() as u64),
            TransferDirection::Upload,
            "k",
        );
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
        assert_eq!(reader.bytes_transferred(), 10_000);
    }

    #[tokio::test]
    async fn test_collect_stream() {
        let chunks: Vec<Result<Bytes, StorageError>> = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let stream: ByteStream = Box::pin(stream::iter(chunks));
        let bytes = collect_stream(stream, Some(11), "k").await.unwrap();
        assert_eq!(&bytes[..], b"hello world");
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let chunks: Vec<Result<Bytes, StorageError>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StorageError::DownloadFailed("connection reset".into())),
        ];
        let stream: ByteStream = Box::pin(stream::iter(chunks));
        let dir = tempfile::tempdir().unwrap();
        let result = write_stream_to_path(stream, &dir.path().join("out"), None, "k").await;
        assert!(matches!(result, Err(StorageError::DownloadFailed(_))));
    }

    #[tokio::test]
    async fn test_open_upload_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thumb.png");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let (mut reader, size) = open_upload(&path, "thumb.png").await.unwrap();
        assert_eq!(size, 10);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"0123456789");
    }
}
