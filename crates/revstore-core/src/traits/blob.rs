//! Blob store trait for pluggable revision content backends.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};

use crate::error::{AppError, ErrorKind};
use crate::result::AppResult;

/// A byte stream type used for reading and writing blob contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Outcome of a successful [`BlobStore::put`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlobWrite {
    /// Key the blob was published under.
    pub key: String,
    /// Number of bytes written.
    pub size_bytes: u64,
    /// Lowercase hex SHA-256 of the content.
    pub checksum_sha256: String,
}

/// A published blob as reported by [`BlobStore::list`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BlobInfo {
    /// Key within the store.
    pub key: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Last modification time, if the backend tracks it.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Trait for revision content backends.
///
/// Keys are chosen by the caller and are never reused. Implementations must
/// make [`put`](BlobStore::put) atomic: readers either see no blob under the
/// key or the complete content, never a prefix of it.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local").
    fn provider_type(&self) -> &str;

    /// Check whether the backend is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Stream `data` into a temporary location, persist it, then publish it
    /// under `key` in a single step.
    ///
    /// If the stream yields an error, or more than `max_bytes` bytes, the
    /// temporary data is discarded and nothing is published. Exceeding
    /// `max_bytes` fails with a validation error.
    async fn put(&self, key: &str, data: ByteStream, max_bytes: Option<u64>)
    -> AppResult<BlobWrite>;

    /// Open a published blob for reading.
    async fn get(&self, key: &str) -> AppResult<ByteStream>;

    /// Delete a published blob. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Check whether a blob is published under `key`.
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// List published blobs whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> AppResult<Vec<BlobInfo>>;

    /// Remove abandoned temporary writes older than `max_age`. Returns the
    /// number of entries removed.
    async fn purge_temp(&self, max_age: Duration) -> AppResult<u64>;

    /// Read a whole blob into memory.
    async fn read_bytes(&self, key: &str) -> AppResult<Bytes> {
        collect_stream(self.get(key).await?).await
    }
}

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`].
pub fn bytes_stream(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Drain a [`ByteStream`] into one contiguous buffer.
pub async fn collect_stream(mut stream: ByteStream) -> AppResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| AppError::with_source(ErrorKind::Storage, "Stream read error", e))?;
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_stream_concatenates_chunks() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from("hello ")), Ok(Bytes::from("world"))];
        let stream: ByteStream = Box::pin(futures::stream::iter(chunks));
        let data = collect_stream(stream).await.unwrap();
        assert_eq!(&data[..], b"hello world");
    }

    #[tokio::test]
    async fn test_collect_stream_surfaces_errors_as_storage() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from("partial")),
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client went away")),
        ];
        let stream: ByteStream = Box::pin(futures::stream::iter(chunks));
        let err = collect_stream(stream).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_bytes_stream_single_chunk() {
        let data = collect_stream(bytes_stream(vec![1u8, 2, 3])).await.unwrap();
        assert_eq!(&data[..], &[1, 2, 3]);
    }
}
