//! File revision entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use revstore_core::types::{FileId, RevisionId};

use super::naming;

/// One immutable, fully stored version of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileRevision {
    /// Unique revision identifier.
    pub id: RevisionId,
    /// The owning file document.
    pub file_id: FileId,
    /// Position in the file's history, starting at 1 with no gaps.
    pub revision_number: i32,
    /// When the revision was committed.
    pub uploaded_at: DateTime<Utc>,
    /// Content size in bytes.
    pub byte_size: i64,
    /// MIME type.
    pub content_type: String,
    /// Lowercased extension with leading dot, or empty.
    pub file_extension: String,
    /// Key of the content in the blob store.
    pub storage_key: String,
    /// Hex SHA-256 of the content.
    pub checksum_sha256: Option<String>,
}

impl FileRevision {
    /// Size formatted for humans, e.g. `"1.5 KB"`.
    pub fn formatted_size(&self) -> String {
        naming::format_size(self.byte_size.max(0) as u64)
    }
}

/// Data required to insert a revision row.
///
/// The revision number is not part of it: the metadata store assigns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRevision {
    /// Pre-allocated revision id.
    pub id: RevisionId,
    /// Content size in bytes.
    pub byte_size: i64,
    /// MIME type.
    pub content_type: String,
    /// Lowercased extension with leading dot, or empty.
    pub file_extension: String,
    /// Key of the already-published blob.
    pub storage_key: String,
    /// Hex SHA-256 of the content.
    pub checksum_sha256: Option<String>,
}

impl NewRevision {
    /// Materialize the row that will be stored for `file_id` at `revision_number`.
    pub fn into_revision(
        self,
        file_id: FileId,
        revision_number: i32,
        uploaded_at: DateTime<Utc>,
    ) -> FileRevision {
        FileRevision {
            id: self.id,
            file_id,
            revision_number,
            uploaded_at,
            byte_size: self.byte_size,
            content_type: self.content_type,
            file_extension: self.file_extension,
            storage_key: self.storage_key,
            checksum_sha256: self.checksum_sha256,
        }
    }
}
