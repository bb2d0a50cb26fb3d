//! Download results.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use revstore_core::result::AppResult;
use revstore_core::traits::blob::{ByteStream, collect_stream};
use revstore_entity::FileRevision;

/// A resolved revision together with its content stream.
pub struct RevisionDownload {
    /// The revision that was resolved.
    pub revision: FileRevision,
    /// Filename to serve the content under.
    pub suggested_filename: String,
    /// MIME type of the content.
    pub content_type: String,
    /// Lowercased extension with leading dot, or empty.
    pub file_extension: String,
    /// Content size in bytes.
    pub byte_size: i64,
    /// Whether this is the file's latest revision.
    pub is_latest: bool,
    /// The content.
    pub stream: ByteStream,
}

impl std::fmt::Debug for RevisionDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionDownload")
            .field("revision", &self.revision)
            .field("suggested_filename", &self.suggested_filename)
            .field("content_type", &self.content_type)
            .field("byte_size", &self.byte_size)
            .field("is_latest", &self.is_latest)
            .finish_non_exhaustive()
    }
}

impl RevisionDownload {
    /// Read the whole content into memory.
    pub async fn into_bytes(self) -> AppResult<Bytes> {
        collect_stream(self.stream).await
    }
}

/// Outcome of re-hashing a stored revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionVerification {
    /// The checked revision.
    pub revision_number: i32,
    /// Checksum recorded at upload, if any.
    pub expected_sha256: Option<String>,
    /// Checksum of the content as stored now.
    pub actual_sha256: String,
    /// Bytes read back.
    pub byte_size: u64,
    /// Whether the checksum and the size both match the record.
    pub intact: bool,
}
