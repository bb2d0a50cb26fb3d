//! The metadata store contract.
//!
//! A [`MetadataStore`] owns the `file_documents` / `file_revisions` records.
//! Implementations must make revision-number allocation race-free: two
//! concurrent [`MetadataStore::insert_next_revision`] calls for the same file
//! either get distinct consecutive numbers or one of them fails with
//! [`ErrorKind::Conflict`](revstore_core::error::ErrorKind::Conflict) and
//! leaves nothing behind.

use async_trait::async_trait;

use revstore_core::result::AppResult;
use revstore_core::types::{FileId, OwnerId};
use revstore_entity::{FileDocument, FileRecord, FileRevision, NewFile, NewRevision, OwnerStats};

/// Persistent storage for file documents and revision records.
///
/// Documents whose deletion has started (`deleting_at` set), and their
/// revisions, are invisible to every read except
/// [`find_file_any`](Self::find_file_any), [`find_deleting`](Self::find_deleting)
/// and [`storage_keys`](Self::storage_keys).
#[async_trait]
pub trait MetadataStore: Send + Sync + std::fmt::Debug + 'static {
    /// Human-readable backend name.
    fn backend_name(&self) -> &'static str;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Insert a document and its revision 1 atomically.
    async fn create_file(&self, file: NewFile, first: NewRevision) -> AppResult<FileDocument>;

    /// Find a live document.
    async fn find_file(&self, file_id: FileId) -> AppResult<Option<FileRecord>>;

    /// Find a document including one whose deletion is in progress.
    async fn find_file_any(&self, file_id: FileId) -> AppResult<Option<FileRecord>>;

    /// Load a live document with its latest revision and revision count, read
    /// from one consistent snapshot.
    async fn load_document(&self, file_id: FileId) -> AppResult<Option<FileDocument>>;

    /// Allocate `max(revision_number) + 1` and insert the revision in one
    /// atomic step, bumping the document's `updated_at`.
    ///
    /// Fails with `NotFound` if the document is missing or being deleted and
    /// with `Conflict` if the number was taken concurrently.
    async fn insert_next_revision(
        &self,
        file_id: FileId,
        revision: NewRevision,
    ) -> AppResult<FileRevision>;

    /// Find a revision by number.
    async fn find_revision(
        &self,
        file_id: FileId,
        revision_number: i32,
    ) -> AppResult<Option<FileRevision>>;

    /// The revision with the highest number.
    async fn latest_revision(&self, file_id: FileId) -> AppResult<Option<FileRevision>>;

    /// All revisions ordered by ascending number.
    async fn list_revisions(&self, file_id: FileId) -> AppResult<Vec<FileRevision>>;

    /// Storage keys of every revision of a document, tombstoned or not.
    async fn storage_keys(&self, file_id: FileId) -> AppResult<Vec<String>>;

    /// Live documents of an owner, most recently updated first. `search`
    /// filters by case-insensitive substring of the display name.
    async fn list_files(
        &self,
        owner_id: OwnerId,
        search: Option<&str>,
    ) -> AppResult<Vec<FileDocument>>;

    /// Change the display name of a live document.
    async fn rename_file(&self, file_id: FileId, display_name: &str) -> AppResult<FileRecord>;

    /// Set the deletion tombstone. Returns `false` if the document does not
    /// exist. Marking an already-marked document keeps the first timestamp.
    async fn mark_deleting(&self, file_id: FileId) -> AppResult<bool>;

    /// Remove a tombstoned document and all of its revision rows.
    async fn purge_file(&self, file_id: FileId) -> AppResult<bool>;

    /// Documents with a deletion in progress, oldest first.
    async fn find_deleting(&self) -> AppResult<Vec<FileRecord>>;

    /// Whether any revision row points at `storage_key`.
    async fn is_storage_key_referenced(&self, storage_key: &str) -> AppResult<bool>;

    /// Aggregate statistics over an owner's live documents.
    async fn owner_stats(&self, owner_id: OwnerId) -> AppResult<OwnerStats>;
}
