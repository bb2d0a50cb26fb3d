//! Upload input.

use bytes::Bytes;
use futures::stream::{self, StreamExt};

use revstore_core::error::{AppError, ErrorKind};
use revstore_core::result::AppResult;
use revstore_core::traits::blob::{ByteStream, bytes_stream};

/// Content of one upload: the byte stream plus what the client said about it.
pub struct UploadContent {
    /// The content. Must be finite.
    pub stream: ByteStream,
    /// MIME type declared by the client.
    pub content_type: Option<String>,
    /// Original filename on the client, used for the extension.
    pub filename: Option<String>,
}

impl std::fmt::Debug for UploadContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadContent")
            .field("content_type", &self.content_type)
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

impl UploadContent {
    /// Upload from a stream.
    pub fn new(stream: ByteStream) -> Self {
        Self {
            stream,
            content_type: None,
            filename: None,
        }
    }

    /// Upload from an in-memory buffer.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(bytes_stream(data))
    }

    /// Set the declared MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the client-side filename.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Fail with a validation error if `stream` yields no bytes at all.
///
/// Consumes leading empty chunks until the first non-empty one, which is
/// put back in front of the rest, so an empty upload never reaches storage.
pub(crate) async fn reject_empty(mut data: ByteStream) -> AppResult<ByteStream> {
    while let Some(chunk) = data.next().await {
        let chunk = chunk
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Upload stream failed", e))?;
        if !chunk.is_empty() {
            return Ok(Box::pin(stream::once(async move { Ok::<_, std::io::Error>(chunk) }).chain(data)));
        }
    }
    Err(AppError::validation("File is empty"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use revstore_core::traits::blob::collect_stream;

    #[tokio::test]
    async fn test_reject_empty_stream() {
        let empty: ByteStream = Box::pin(stream::empty());
        let Err(err) = reject_empty(empty).await else {
            panic!("empty stream accepted");
        };
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, "File is empty");
    }

    #[tokio::test]
    async fn test_reject_empty_keeps_all_bytes() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::new()),
            Ok(Bytes::from("ab")),
            Ok(Bytes::from("cd")),
        ];
        let checked = reject_empty(Box::pin(stream::iter(chunks))).await.unwrap();
        assert_eq!(&collect_stream(checked).await.unwrap()[..], b"abcd");
    }

    #[tokio::test]
    async fn test_reject_empty_surfaces_stream_errors() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "aborted",
        ))];
        let Err(err) = reject_empty(Box::pin(stream::iter(chunks))).await else {
            panic!("stream error swallowed");
        };
        assert_eq!(err.kind, ErrorKind::Storage);
    }
}
