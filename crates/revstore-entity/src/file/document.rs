//! File document entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use revstore_core::types::{FileId, OwnerId};

use super::revision::FileRevision;

/// A `file_documents` row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    /// Stable file identifier.
    pub id: FileId,
    /// The single, immutable owner.
    pub owner_id: OwnerId,
    /// Name shown to the owner and used for download filenames.
    pub display_name: String,
    /// When the document (and its first revision) was created.
    pub created_at: DateTime<Utc>,
    /// Bumped on every new revision or rename.
    pub updated_at: DateTime<Utc>,
    /// Set once deletion has started; such documents are invisible to reads.
    pub deleting_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Whether `owner_id` owns this file.
    pub fn is_owned_by(&self, owner_id: OwnerId) -> bool {
        self.owner_id == owner_id
    }

    /// Whether deletion of this file has begun.
    pub fn is_deleting(&self) -> bool {
        self.deleting_at.is_some()
    }
}

/// A file document together with its derived revision fields.
///
/// `latest_revision` and `revision_count` are computed from the revision
/// set on read; they are never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDocument {
    /// Stable file identifier.
    pub id: FileId,
    /// The file owner.
    pub owner_id: OwnerId,
    /// Display name.
    pub display_name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Revision with the highest revision number.
    pub latest_revision: FileRevision,
    /// Number of stored revisions.
    pub revision_count: i64,
}

impl FileDocument {
    /// Assemble a document from its row and derived values.
    pub fn from_parts(record: FileRecord, latest_revision: FileRevision, revision_count: i64) -> Self {
        Self {
            id: record.id,
            owner_id: record.owner_id,
            display_name: record.display_name,
            created_at: record.created_at,
            updated_at: record.updated_at,
            latest_revision,
            revision_count,
        }
    }
}

/// Data required to create a new file document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFile {
    /// Pre-allocated id (the blob key embeds it, so it is chosen up front).
    pub id: FileId,
    /// The owner.
    pub owner_id: OwnerId,
    /// Validated, trimmed display name.
    pub display_name: String,
}
